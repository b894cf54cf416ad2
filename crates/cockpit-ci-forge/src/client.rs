//! HTTP client with conditional-request caching (spec.md §4.1).
//!
//! Ported from `GitHub.get`/`get_obj`/`post` in `lib/aio/github.py`,
//! generalized away from the GitHub-specific bits (which live in
//! [`crate::github`]).

use std::sync::Mutex;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::cache::{LruCache, DEFAULT_CAPACITY};
use crate::error::ForgeError;
use crate::retry::retry_http;

const IF_NONE_MATCH: &str = "if-none-match";
const IF_MODIFIED_SINCE: &str = "if-modified-since";

#[derive(Debug, Clone, Default)]
struct CacheEntry {
    /// Precondition headers to replay on the next request
    /// (`if-none-match`/`if-modified-since`).
    conditions: Vec<(String, String)>,
    value: Value,
}

/// Construction-time configuration for [`Client`].
pub struct ClientConfig {
    pub base_url: reqwest::Url,
    /// Headers attached to every request (e.g. `Authorization`).
    pub headers: HeaderMap,
    /// When true, [`Client::post`] logs and echoes the body back
    /// instead of sending it (spec.md §4.1, "dry-run mode").
    pub dry_run: bool,
    pub cache_capacity: usize,
    pub http: reqwest::Client,
}

impl ClientConfig {
    pub fn cache_capacity_or_default(&self) -> usize {
        if self.cache_capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            self.cache_capacity
        }
    }
}

/// A conditional-cache-aware JSON REST client for one forge API base
/// URL. Cheaply [`Clone`]-able (internals are behind `Arc`/`Mutex` via
/// `reqwest::Client`'s own sharing and an internal mutex for the
/// cache), so a [`crate::github::GitHub`] adapter can hand out status
/// handles that share the same cache and connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: reqwest::Url,
    headers: HeaderMap,
    dry_run: bool,
    cache: std::sync::Arc<Mutex<LruCache<CacheEntry>>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let capacity = config.cache_capacity_or_default();
        Self {
            http: config.http,
            base_url: config.base_url,
            headers: config.headers,
            dry_run: config.dry_run,
            cache: std::sync::Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn resource_url(&self, resource: &str, params: Option<&[(&str, &str)]>) -> Result<reqwest::Url, ForgeError> {
        let mut url = self
            .base_url
            .join(resource)
            .map_err(|e| ForgeError::Url(e.to_string()))?;
        if let Some(params) = params {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    /// GET `resource`, revalidating against the cached entry (if any)
    /// with `If-None-Match`/`If-Modified-Since`. On a `304`, returns
    /// the cached value and refreshes its recency; otherwise caches
    /// the fresh value under its new preconditions.
    pub async fn get(&self, resource: &str, params: Option<&[(&str, &str)]>) -> Result<Value, ForgeError> {
        let url = self.resource_url(resource, params)?;
        let key = url.as_str().to_string();

        retry_http(|| self.get_once(&url, &key)).await
    }

    async fn get_once(&self, url: &reqwest::Url, key: &str) -> Result<Value, ForgeError> {
        let cached = { self.cache.lock().unwrap().get(key).cloned() };

        let mut headers = self.headers.clone();
        if let Some(entry) = &cached {
            for (name, value) in &entry.conditions {
                if let (Ok(name), Ok(value)) = (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) {
                    headers.insert(name, value);
                }
            }
        }

        tracing::debug!(%url, cached = cached.is_some(), "forge GET");
        let response = self
            .http
            .request(Method::GET, url.clone())
            .headers(headers)
            .send()
            .await
            .map_err(|source| ForgeError::Transport { url: url.to_string(), source })?;

        let status = response.status();
        let conditions = extract_conditions(response.headers());

        if status == StatusCode::NOT_MODIFIED {
            if let Some(entry) = cached {
                tracing::debug!(%url, "cache hit, revalidated with 304");
                self.cache.lock().unwrap().add(key.to_string(), entry.clone());
                return Ok(entry.value);
            }
            // A 304 against an entry we evicted: treat as a schema
            // surprise rather than silently returning nothing.
            return Err(ForgeError::Schema(format!("{url} returned 304 with no cached entry")));
        }

        if !status.is_success() {
            return Err(ForgeError::Status { url: url.to_string(), status });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|source| ForgeError::Transport { url: url.to_string(), source })?;

        tracing::debug!(%url, "cache miss, caching fresh value");
        self.cache.lock().unwrap().add(key.to_string(), CacheEntry { conditions, value: value.clone() });
        Ok(value)
    }

    pub async fn get_obj(
        &self,
        resource: &str,
        params: Option<&[(&str, &str)]>,
    ) -> Result<serde_json::Map<String, Value>, ForgeError> {
        match self.get(resource, params).await? {
            Value::Object(map) => Ok(map),
            other => Err(ForgeError::Schema(format!("expected a JSON object, got {other}"))),
        }
    }

    /// JSON POST. In dry-run mode, logs the body at INFO and echoes it
    /// back without making a request (spec.md §9, "dry-run POSTs").
    pub async fn post(&self, resource: &str, body: Option<Value>) -> Result<Value, ForgeError> {
        let body = body.unwrap_or(Value::Null);

        if self.dry_run {
            tracing::info!(resource, body = %serde_json::to_string_pretty(&body).unwrap_or_default(), "** would post (dry-run)");
            return Ok(body);
        }

        let url = self.resource_url(resource, None)?;
        retry_http(|| self.post_once(&url, &body)).await
    }

    async fn post_once(&self, url: &reqwest::Url, body: &Value) -> Result<Value, ForgeError> {
        tracing::debug!(%url, "forge POST");
        let response = self
            .http
            .request(Method::POST, url.clone())
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await
            .map_err(|source| ForgeError::Transport { url: url.to_string(), source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ForgeError::Status { url: url.to_string(), status });
        }

        response
            .json()
            .await
            .map_err(|source| ForgeError::Transport { url: url.to_string(), source })
    }
}

fn extract_conditions(headers: &HeaderMap) -> Vec<(String, String)> {
    let mut conditions = Vec::new();
    if let Some(etag) = headers.get(reqwest::header::ETAG) {
        if let Ok(value) = etag.to_str() {
            conditions.push((IF_NONE_MATCH.to_string(), value.to_string()));
        }
    }
    if let Some(last_modified) = headers.get(reqwest::header::LAST_MODIFIED) {
        if let Ok(value) = last_modified.to_str() {
            conditions.push((IF_MODIFIED_SINCE.to_string(), value.to_string()));
        }
    }
    conditions
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer, dry_run: bool) -> Client {
        Client::new(ClientConfig {
            base_url: reqwest::Url::parse(&format!("{}/", server.uri())).unwrap(),
            headers: HeaderMap::new(),
            dry_run,
            cache_capacity: 8,
            http: reqwest::Client::new(),
        })
    }

    #[tokio::test]
    async fn get_caches_and_revalidates_on_etag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r"))
            .respond_with(ResponseTemplate::new(200).insert_header("etag", "\"v1\"").set_body_json(json!({"default_branch": "main"})))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r"))
            .and(header("if-none-match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, false);
        let first = client.get_obj("repos/o/r", None).await.unwrap();
        let second = client.get_obj("repos/o/r", None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first["default_branch"], "main");
    }

    #[tokio::test]
    async fn post_in_dry_run_echoes_body_without_sending() {
        let server = MockServer::start().await;
        // No mock registered: a real request would fail the test.
        let client = client_for(&server, true);
        let body = json!({"state": "pending"});
        let echoed = client.post("repos/o/r/statuses/sha", Some(body.clone())).await.unwrap();
        assert_eq!(echoed, body);
    }

    #[tokio::test]
    async fn get_obj_rejects_non_object_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/x")).respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2]))).mount(&server).await;
        let client = client_for(&server, false);
        let err = client.get_obj("x", None).await.unwrap_err();
        assert!(matches!(err, ForgeError::Schema(_)));
    }
}
