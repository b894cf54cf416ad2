//! HTTP client with conditional-request caching (spec.md §4.1) and a
//! GitHub-shaped forge adapter (spec.md §4.2).

mod cache;
mod client;
mod error;
mod github;
mod retry;

pub use cache::LruCache;
pub use client::{Client, ClientConfig};
pub use error::ForgeError;
pub use github::{GitHub, GitHubConfig, GitHubStatus};

use async_trait::async_trait;
use cockpit_ci_core::domain::status::Status;
use cockpit_ci_core::{Subject, SubjectSpecification};

/// What the job supervisor needs from a code-hosting forge.
#[async_trait]
pub trait Forge: Send + Sync {
    async fn resolve_subject(&self, spec: &SubjectSpecification) -> Result<Subject, ForgeError>;

    /// Returns `Some(reason)` if the pull request has moved on since
    /// `expected_sha` was resolved, `None` if it's unchanged, and
    /// swallows transient network errors by also returning `None`
    /// (spec.md §4.2: "must not kill an otherwise-healthy job").
    async fn check_pr_changed(&self, repo: &str, pull_nr: u64, expected_sha: &str) -> Option<String>;

    /// `None` on a 404 (no such file at that revision), not an error.
    async fn read_file(&self, subject: &Subject, filename: &str) -> Result<Option<String>, ForgeError>;

    async fn open_issue(&self, repo: &str, issue_body: serde_json::Value) -> Result<(), ForgeError>;

    /// A handle bound to `(repo, sha, context, link)`; posting is a
    /// no-op when `context` is `None` (spec.md §4.2).
    fn get_status(&self, repo: &str, sha: &str, context: Option<&str>, link: &str) -> Box<dyn Status>;

    /// The URL the container runner passes to the checkout entrypoint
    /// for `repo` (`Subject.clone_url` in `lib/aio/base.py`).
    fn clone_url_for(&self, repo: &str) -> String;
}
