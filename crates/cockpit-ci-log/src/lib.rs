//! Chunked log streaming, an attachments scanner, and a directory-page
//! index over a write destination (spec.md §4.5, §4.6).

mod attachments;
mod index;
mod streamer;

pub use attachments::scan as scan_attachments;
pub use index::Index;
pub use streamer::LogStreamer;
