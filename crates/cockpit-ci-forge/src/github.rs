//! GitHub-shaped forge adapter (spec.md §4.2, §6.4).
//!
//! Ported from `GitHub`/`GitHubStatus` in `lib/aio/github.py`.

use async_trait::async_trait;
use cockpit_ci_core::domain::status::{Status, StatusState};
use cockpit_ci_core::{Subject, SubjectSpecification};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::client::{Client, ClientConfig};
use crate::error::ForgeError;
use crate::retry::retry_http;
use crate::Forge;

/// Construction-time configuration for [`GitHub`], mirroring
/// `[forge.github]` in spec.md §6.2.
pub struct GitHubConfig {
    pub clone_url: reqwest::Url,
    pub api_url: reqwest::Url,
    pub content_url: reqwest::Url,
    pub token: Option<String>,
    /// `post = true` in config; dry-run is `!post`.
    pub post: bool,
    pub ca_pem: Option<Vec<u8>>,
    pub user_agent: Option<String>,
    pub cache_capacity: usize,
}

#[derive(Clone)]
pub struct GitHub {
    client: Client,
    content_http: reqwest::Client,
    content_url: reqwest::Url,
    clone_url: reqwest::Url,
}

fn user_agent(config: &GitHubConfig) -> String {
    config
        .user_agent
        .clone()
        .unwrap_or_else(|| format!("cockpit-ci/{}", env!("CARGO_PKG_VERSION")))
}

fn build_http_client(config: &GitHubConfig) -> Result<reqwest::Client, ForgeError> {
    let mut builder = reqwest::Client::builder().user_agent(user_agent(config));
    if let Some(pem) = &config.ca_pem {
        let cert = reqwest::Certificate::from_pem(pem).map_err(|e| ForgeError::Schema(format!("invalid CA bundle: {e}")))?;
        builder = builder.add_root_certificate(cert);
    }
    builder.build().map_err(|source| ForgeError::Transport { url: "<client build>".into(), source })
}

impl GitHub {
    pub fn new(config: GitHubConfig) -> Result<Self, ForgeError> {
        let dry_run = !config.post;

        // Token is mandatory only when actually posting (spec.md §9's
        // "token is mandatory if post = true", ported verbatim).
        if !dry_run && config.token.as_deref().unwrap_or("").is_empty() {
            return Err(ForgeError::Schema("forge.github.token is required when post = true".into()));
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = &config.token {
            if !token.is_empty() {
                let value = HeaderValue::from_str(&format!("token {}", token.trim()))
                    .map_err(|_| ForgeError::Schema("token contains invalid header characters".into()))?;
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
        }

        let http = build_http_client(&config)?;
        let client = Client::new(ClientConfig {
            base_url: config.api_url.clone(),
            headers,
            dry_run,
            cache_capacity: config.cache_capacity,
            http: http.clone(),
        });

        Ok(Self {
            client,
            content_http: http,
            content_url: config.content_url,
            clone_url: config.clone_url,
        })
    }

    pub fn clone_url_for(&self, repo: &str) -> String {
        format!("{}/{repo}.git", self.clone_url.as_str().trim_end_matches('/'))
    }

    async fn read_file_once(&self, url: &reqwest::Url) -> Result<Option<String>, ForgeError> {
        let response = self
            .content_http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| ForgeError::Transport { url: url.to_string(), source })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ForgeError::Status { url: url.to_string(), status: response.status() });
        }
        response
            .text()
            .await
            .map(Some)
            .map_err(|source| ForgeError::Transport { url: url.to_string(), source })
    }
}

#[async_trait]
impl Forge for GitHub {
    async fn resolve_subject(&self, spec: &SubjectSpecification) -> Result<Subject, ForgeError> {
        if let Some(pull) = spec.pull {
            let pr = self.client.get_obj(&format!("repos/{}/pulls/{pull}", spec.repo), None).await?;
            let head = get_dict(&pr, "head")?;
            let sha = match &spec.sha {
                Some(sha) => sha.clone(),
                None => get_str(head, "sha")?,
            };
            let base = get_dict(&pr, "base")?;
            let rebase = match &spec.target {
                Some(target) => Some(target.clone()),
                None => Some(get_str(base, "ref")?),
            };
            let mut subject = Subject::new("github", spec.repo.clone(), sha);
            subject.rebase = rebase;
            return Ok(subject);
        }

        if let Some(sha) = &spec.sha {
            let mut subject = Subject::new("github", spec.repo.clone(), sha.clone());
            subject.rebase = spec.target.clone();
            return Ok(subject);
        }

        let branch = match &spec.branch {
            Some(branch) => branch.clone(),
            None => {
                let repo = self.client.get_obj(&format!("repos/{}", spec.repo), None).await?;
                get_str(&repo, "default_branch")?
            }
        };
        let reference = self.client.get_obj(&format!("repos/{}/git/refs/heads/{branch}", spec.repo), None).await?;
        let object = get_dict(&reference, "object")?;
        let sha = get_str(object, "sha")?;
        let mut subject = Subject::new("github", spec.repo.clone(), sha);
        subject.rebase = spec.target.clone();
        Ok(subject)
    }

    async fn check_pr_changed(&self, repo: &str, pull_nr: u64, expected_sha: &str) -> Option<String> {
        match self.client.get_obj(&format!("repos/{repo}/pulls/{pull_nr}"), None).await {
            Ok(pull) => {
                let state = get_str(&pull, "state").ok()?;
                if state != "open" {
                    return Some(format!("{repo}#{pull_nr} is closed"));
                }
                let head = get_dict(&pull, "head").ok()?;
                let sha = get_str(head, "sha").ok()?;
                if sha != expected_sha {
                    return Some(format!("{repo}#{pull_nr} changed"));
                }
                None
            }
            Err(ForgeError::Schema(msg)) => Some(format!("unexpected error when parsing pull request: {msg}")),
            Err(err) if err.is_retryable() => {
                // Transient network trouble: don't kill an otherwise
                // healthy job over a flaky poll (spec.md §4.2).
                tracing::warn!(repo, pull_nr, error = %err, "error polling for PR change");
                None
            }
            Err(err) => {
                tracing::warn!(repo, pull_nr, error = %err, "error polling for PR change");
                None
            }
        }
    }

    async fn read_file(&self, subject: &Subject, filename: &str) -> Result<Option<String>, ForgeError> {
        let url = self
            .content_url
            .join(&format!("{}/{}/{}", subject.repo, subject.sha, filename))
            .map_err(|e| ForgeError::Url(e.to_string()))?;
        retry_http(|| self.read_file_once(&url)).await
    }

    async fn open_issue(&self, repo: &str, issue_body: Value) -> Result<(), ForgeError> {
        self.client.post(&format!("repos/{repo}/issues"), Some(issue_body)).await?;
        Ok(())
    }

    fn get_status(&self, repo: &str, sha: &str, context: Option<&str>, link: &str) -> Box<dyn Status> {
        Box::new(GitHubStatus {
            github: self.clone(),
            resource: format!("repos/{repo}/statuses/{sha}"),
            context: context.map(str::to_string),
            link: link.to_string(),
        })
    }

    fn clone_url_for(&self, repo: &str) -> String {
        GitHub::clone_url_for(self, repo)
    }
}

/// A status handle bound to one `(repo, sha, context, link)` tuple.
/// Posting is a no-op when `context` is absent: free-floating statuses
/// are not permitted (spec.md §4.2).
pub struct GitHubStatus {
    github: GitHub,
    resource: String,
    context: Option<String>,
    link: String,
}

#[async_trait]
impl Status for GitHubStatus {
    async fn post(&self, state: StatusState, description: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let Some(context) = &self.context else {
            return Ok(());
        };

        let hostname = hostname();
        let body = json!({
            "context": context,
            "state": state.as_str(),
            "description": format!("{description} [{hostname}]"),
            "target_url": self.link,
        });

        self.github
            .client
            .post(&self.resource, Some(body))
            .await
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
        Ok(())
    }
}

fn hostname() -> String {
    gethostname::gethostname().into_string().unwrap_or_else(|_| "unknown".to_string())
}

fn get_dict<'a>(obj: &'a serde_json::Map<String, Value>, key: &str) -> Result<&'a serde_json::Map<String, Value>, ForgeError> {
    obj.get(key)
        .and_then(Value::as_object)
        .ok_or_else(|| ForgeError::Schema(format!("expected object field {key:?}")))
}

fn get_str(obj: &serde_json::Map<String, Value>, key: &str) -> Result<String, ForgeError> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ForgeError::Schema(format!("expected string field {key:?}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config_for(server: &MockServer, post: bool) -> GitHubConfig {
        let base = format!("{}/", server.uri());
        GitHubConfig {
            clone_url: reqwest::Url::parse(&base).unwrap(),
            api_url: reqwest::Url::parse(&base).unwrap(),
            content_url: reqwest::Url::parse(&base).unwrap(),
            token: Some("t0ken".into()),
            post,
            ca_pem: None,
            user_agent: None,
            cache_capacity: 8,
        }
    }

    fn spec(repo: &str) -> SubjectSpecification {
        SubjectSpecification { forge: None, repo: repo.to_string(), sha: None, pull: None, branch: None, target: None }
    }

    #[tokio::test]
    async fn resolve_subject_from_pull_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/pulls/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "state": "open",
                "head": {"sha": "a".repeat(40)},
                "base": {"ref": "main"},
            })))
            .mount(&server)
            .await;

        let github = GitHub::new(config_for(&server, false)).unwrap();
        let mut s = spec("o/r");
        s.pull = Some(42);
        let subject = github.resolve_subject(&s).await.unwrap();
        assert_eq!(subject.sha, "a".repeat(40));
        assert_eq!(subject.rebase.as_deref(), Some("main"));
    }

    #[tokio::test]
    async fn resolve_subject_from_bare_sha_is_a_pure_passthrough() {
        let server = MockServer::start().await;
        let github = GitHub::new(config_for(&server, false)).unwrap();
        let mut s = spec("o/r");
        s.sha = Some("deadbeef".into());
        s.target = Some("release-1".into());
        let subject = github.resolve_subject(&s).await.unwrap();
        assert_eq!(subject.sha, "deadbeef");
        assert_eq!(subject.rebase.as_deref(), Some("release-1"));
    }

    #[tokio::test]
    async fn check_pr_changed_detects_closed_pr() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/pulls/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "closed", "head": {"sha": "x"}})))
            .mount(&server)
            .await;
        let github = GitHub::new(config_for(&server, false)).unwrap();
        let reason = github.check_pr_changed("o/r", 1, "x").await;
        assert_eq!(reason.as_deref(), Some("o/r#1 is closed"));
    }

    #[tokio::test]
    async fn check_pr_changed_detects_new_head_sha() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/pulls/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "open", "head": {"sha": "new-sha"}})))
            .mount(&server)
            .await;
        let github = GitHub::new(config_for(&server, false)).unwrap();
        let reason = github.check_pr_changed("o/r", 1, "old-sha").await;
        assert_eq!(reason.as_deref(), Some("o/r#1 changed"));
    }

    #[tokio::test]
    async fn check_pr_changed_returns_none_when_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/pulls/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "open", "head": {"sha": "same"}})))
            .mount(&server)
            .await;
        let github = GitHub::new(config_for(&server, false)).unwrap();
        assert_eq!(github.check_pr_changed("o/r", 1, "same").await, None);
    }

    #[tokio::test]
    async fn repeated_polling_consumes_one_full_response_and_many_304s() {
        // spec.md §8 S6: 100 consecutive `check_pr_changed` calls with
        // no forge-side change should cost at most one non-304 response.
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/pulls/1"))
            .respond_with(ResponseTemplate::new(200).insert_header("etag", "\"v1\"").set_body_json(json!({"state": "open", "head": {"sha": "same"}})))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/pulls/1"))
            .and(header("if-none-match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304))
            .expect(99)
            .mount(&server)
            .await;

        let github = GitHub::new(config_for(&server, false)).unwrap();
        for _ in 0..100 {
            assert_eq!(github.check_pr_changed("o/r", 1, "same").await, None);
        }
        // wiremock's `expect()` counts are verified when `server` drops.
    }

    #[tokio::test]
    async fn read_file_returns_none_on_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/o/r/sha/missing.txt")).respond_with(ResponseTemplate::new(404)).mount(&server).await;
        let github = GitHub::new(config_for(&server, false)).unwrap();
        let subject = Subject::new("github", "o/r", "sha");
        assert_eq!(github.read_file(&subject, "missing.txt").await.unwrap(), None);
    }

    #[tokio::test]
    async fn post_requires_token_when_not_dry_run() {
        let server = MockServer::start().await;
        let mut config = config_for(&server, true);
        config.token = None;
        assert!(GitHub::new(config).is_err());
    }

    #[tokio::test]
    async fn status_post_is_noop_without_context() {
        let server = MockServer::start().await;
        // No mock registered: a real POST would fail the test.
        let github = GitHub::new(config_for(&server, true)).unwrap();
        let status = github.get_status("o/r", "sha", None, "http://log");
        status.post(StatusState::Pending, "In progress").await.unwrap();
    }
}
