//! Write destinations and the upload queue backing them (spec.md
//! §4.3, §4.4): a filesystem destination for local/NFS log directories
//! and an S3-compatible destination with AWS4 request signing.

mod destination;
mod error;
mod queue;
mod signing;

pub use destination::{
    escape_s3_slug, Destination, FilesystemDestination, FilesystemLogDestinations, LogDestinations,
    S3Destination, S3LogDestinations,
};
pub use error::StoreError;
pub use queue::HttpRequest;
pub use signing::{s3_sign, S3Signer, Signer};
