//! Forge-level error taxonomy (spec.md §4.2, §7).
//!
//! `Schema` errors are a distinct kind from transport errors: the
//! supervisor maps `Schema` to an `error`-class job outcome, the same
//! way it treats any other internal failure, and never to a `failure`.

/// Errors raised by the HTTP client and the GitHub-shaped forge
/// adapter.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}")]
    Status { url: String, status: reqwest::StatusCode },

    #[error("unexpected response shape: {0}")]
    Schema(String),

    #[error("invalid URL: {0}")]
    Url(String),
}

impl ForgeError {
    /// Whether the retry loop in [`crate::retry::retry_http`] should
    /// attempt the request again: transport-level failures and 5xx
    /// responses are transient; everything else (4xx, schema errors)
    /// fails immediately (spec.md §4.1 retry policy).
    pub fn is_retryable(&self) -> bool {
        match self {
            ForgeError::Transport { .. } => true,
            ForgeError::Status { status, .. } => status.as_u16() >= 500,
            ForgeError::Schema(_) | ForgeError::Url(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ForgeError>;
