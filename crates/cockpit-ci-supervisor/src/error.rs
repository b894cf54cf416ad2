//! Error taxonomy for the job supervisor (spec.md §7, §4.8).
//!
//! [`TaskError::Failure`] is a real job outcome (container non-zero
//! exit, timeout, superseded PR) — reported as `failure` and,
//! optionally, as a filed issue. Every [`TaskError::Infra`] variant is
//! an infrastructure problem — reported as `error`, never `failure`,
//! and never files an issue.

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Forge(#[from] cockpit_ci_forge::ForgeError),

    #[error(transparent)]
    Store(#[from] cockpit_ci_store::StoreError),

    #[error(transparent)]
    Runner(#[from] cockpit_ci_runner::RunnerError),

    #[error(transparent)]
    Core(#[from] cockpit_ci_core::CoreError),

    #[error("internal task error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("failed to post status: {0}")]
    Status(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// An outside caller requested cancellation (spec.md §7 kind 7);
    /// the supervisor has already posted `error`/"Cancelled" and
    /// written the closing log line by the time this propagates.
    #[error("job cancelled")]
    Cancelled,
}

/// The terminal event a task in a job's task set can raise. Kept
/// separate from [`SupervisorError`] because `Failure` (a Python
/// exception class in the original, `lib/aio/job.py::Failure`) is not
/// an error at all from the supervisor's point of view — it's a
/// first-class outcome.
#[derive(Debug)]
pub enum TaskError {
    Failure(String),
    /// The job's [`crate::cancel::CancellationToken`] fired: an
    /// outside caller wants this job torn down. Maps to spec.md §7
    /// kind 7, "Cancellation from outside".
    Cancelled,
    Infra(SupervisorError),
}

impl From<SupervisorError> for TaskError {
    fn from(error: SupervisorError) -> Self {
        TaskError::Infra(error)
    }
}

impl From<cockpit_ci_runner::RunnerError> for TaskError {
    fn from(error: cockpit_ci_runner::RunnerError) -> Self {
        match error {
            cockpit_ci_runner::RunnerError::Failure(message) => TaskError::Failure(message),
            other => TaskError::Infra(SupervisorError::Runner(other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
