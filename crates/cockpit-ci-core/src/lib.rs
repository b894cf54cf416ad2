//! Domain model and error taxonomy shared across the cockpit-ci job runner.

pub mod domain;
pub mod telemetry;

pub use domain::error::{CoreError, Result};
pub use domain::job::Job;
pub use domain::status::Status;
pub use domain::subject::{Subject, SubjectSpecification};
