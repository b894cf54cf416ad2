//! Object-store error taxonomy (spec.md §4.3/§4.4).

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}")]
    Status { url: String, status: reqwest::StatusCode },

    #[error("invalid URL: {0}")]
    Url(String),
}

impl StoreError {
    /// Whether the upload queue's retry loop should attempt the
    /// request again: transport failures and 5xx responses are
    /// transient; 4xx errors propagate immediately (spec.md §4.4).
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Transport { .. } => true,
            StoreError::Status { status, .. } => status.as_u16() >= 500,
            StoreError::Io { .. } | StoreError::Url(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
