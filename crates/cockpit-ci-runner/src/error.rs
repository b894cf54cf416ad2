//! Error taxonomy for the container runner (spec.md §4.7, §7).
//!
//! [`RunnerError::Failure`] is the one variant the job supervisor
//! treats as a real job outcome (container exited non-zero); every
//! other variant is an infrastructure problem and becomes an `error`
//! outcome, never a `failure` one.

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The container ran to completion but reported failure: a
    /// non-zero exit code. Maps to spec.md §7 kind 4.
    #[error("{0}")]
    Failure(String),

    /// EOF was reached on the container's output but no cidfile ever
    /// appeared: the container was never created. Maps to spec.md §7
    /// kind 3 ("internal error, not a Failure").
    #[error("failed to create container")]
    ContainerCreateFailed,

    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] cockpit_ci_store::StoreError),

    #[error(transparent)]
    Forge(#[from] cockpit_ci_forge::ForgeError),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
