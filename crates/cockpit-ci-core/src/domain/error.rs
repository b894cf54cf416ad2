//! Domain-level error taxonomy.
//!
//! Kept separate from the transport-level errors in `cockpit-ci-forge`
//! and `cockpit-ci-store`: this enum only covers malformed domain
//! objects (a job spec that doesn't parse, a subject that can't be
//! resolved to anything coherent), not network or storage failures.

/// Errors raised while constructing or validating domain objects.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid job specification: {0}")]
    InvalidJob(String),

    #[error("invalid subject specification: {0}")]
    InvalidSubject(String),

    #[error("failed to parse job specification: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for cockpit-ci-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_job_message() {
        let err = CoreError::InvalidJob("repo is required".to_string());
        assert!(err.to_string().contains("repo is required"));
    }

    #[test]
    fn parse_error_wraps_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: CoreError = serde_err.into();
        assert!(matches!(err, CoreError::Parse(_)));
    }
}
