//! Orchestrates §4.7's container runner with a timeout and optional
//! PR-tracking in a structured-concurrency task set, and reports the
//! outcome to the forge — ported from `run_job()` in `lib/aio/job.py`.

mod cancel;
mod error;
mod supervisor;
mod tasks;

pub use cancel::CancellationToken;
pub use error::{Result, SupervisorError, TaskError};
pub use supervisor::{JobSupervisor, Outcome};
