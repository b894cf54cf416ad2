//! Subject resolution types.
//!
//! A [`SubjectSpecification`] is what a caller supplies (a repo plus
//! one of sha/pull/branch); a [`Subject`] is what the forge adapter
//! resolves it to. Once resolved, a `Subject`'s `sha` never changes
//! for the lifetime of a job execution.

use serde::{Deserialize, Serialize};

use super::error::{CoreError, Result};

/// A user-supplied pointer into a repository, exactly one of
/// `sha`, `pull`, or `branch` should be set; `resolve_subject`
/// in `cockpit-ci-forge` enforces the precedence when more than
/// one is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectSpecification {
    /// Forge driver tag, e.g. `"github"`. Absent means "use the
    /// job context's configured default forge".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forge: Option<String>,

    /// `owner/name`.
    pub repo: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Rebase target branch, used as the `base.ref` when resolving
    /// a pull request, or carried through verbatim for a bare sha.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl SubjectSpecification {
    pub fn validate(&self) -> Result<()> {
        if self.repo.is_empty() {
            return Err(CoreError::InvalidSubject("repo must not be empty".into()));
        }
        if !self.repo.contains('/') {
            return Err(CoreError::InvalidSubject(format!(
                "repo {:?} must be of the form owner/name",
                self.repo
            )));
        }
        Ok(())
    }
}

/// A resolved pointer: a concrete commit on a concrete repo,
/// produced by a forge adapter from a [`SubjectSpecification`].
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub forge: String,
    pub repo: String,
    /// 40-hex commit sha.
    pub sha: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rebase: Option<String>,
}

impl Subject {
    pub fn new(forge: impl Into<String>, repo: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            forge: forge.into(),
            repo: repo.into(),
            sha: sha.into(),
            rebase: None,
        }
    }

    pub fn with_rebase(mut self, rebase: impl Into<String>) -> Self {
        self.rebase = Some(rebase.into());
        self
    }

    /// `https://<forge-clone-host>/<repo>.git`-shaped clone URL is
    /// built by the forge adapter (it owns the host); this just
    /// exposes the pieces the container runner needs to invoke the
    /// entrypoint (`--revision=<sha>`, optional `--rebase=<rebase>`).
    pub fn revision_args(&self) -> Vec<String> {
        let mut args = vec![format!("--revision={}", self.sha)];
        if let Some(rebase) = &self.rebase {
            args.push(format!("--rebase={rebase}"));
        }
        args
    }
}
