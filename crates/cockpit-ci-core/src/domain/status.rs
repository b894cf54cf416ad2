//! The status handle posted against a commit on the forge.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One of the four labels a commit status can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    Pending,
    Success,
    Failure,
    Error,
}

impl StatusState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusState::Pending => "pending",
            StatusState::Success => "success",
            StatusState::Failure => "failure",
            StatusState::Error => "error",
        }
    }
}

/// A handle bound to `(repo, sha, context, link)`. Forge adapters
/// implement this to PUT a commit-status object; if the job's
/// `context` is absent, `post` is a no-op (free-floating statuses are
/// not permitted, per spec.md §4.2).
///
/// The error is boxed rather than an associated type so that the
/// supervisor can hold a `Box<dyn Status>` without being generic over
/// every forge adapter's error type.
#[async_trait]
pub trait Status: Send + Sync {
    async fn post(
        &self,
        state: StatusState,
        description: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&StatusState::Pending).unwrap(), "\"pending\"");
        assert_eq!(serde_json::to_string(&StatusState::Failure).unwrap(), "\"failure\"");
    }

    #[test]
    fn as_str_matches_forge_vocabulary() {
        assert_eq!(StatusState::Success.as_str(), "success");
        assert_eq!(StatusState::Error.as_str(), "error");
    }
}
