//! Typed shapes for the `[container]`, `[logs]`, `[forge]` sections
//! (spec.md §6.2). Deserialized via `serde` directly from the merged
//! configuration tree rather than through dynamic JSON getters —
//! idiomatic Rust puts the schema in the type, not in call-site checks.

use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerConfig {
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default, rename = "run-args")]
    pub run_args: Vec<String>,
    #[serde(default)]
    pub secrets: BTreeMap<String, Vec<String>>,
    #[serde(rename = "default-image")]
    pub default_image: String,
    /// Tee container output to the runner's own stdout. Ambient
    /// operability addition (SPEC_FULL.md §2.2), not in the original
    /// TOML schema, defaults off.
    #[serde(default)]
    pub debug: bool,
}

/// The `[logs]` table names a `driver` and carries a nested section
/// per driver (`[logs.local]`, `[logs.s3]`); only the section matching
/// `driver` is required to be present. Mirrors the original's
/// `LOG_DRIVERS` dispatch-by-string in `jobcontext.py`.
#[derive(Debug, Clone, Deserialize)]
pub struct LogsConfig {
    pub driver: String,
    pub local: Option<LocalLogConfig>,
    pub s3: Option<S3LogConfig>,
}

impl LogsConfig {
    pub fn resolve(&self) -> Result<LogDriverConfig<'_>, crate::ConfigError> {
        match self.driver.as_str() {
            "local" => self
                .local
                .as_ref()
                .map(LogDriverConfig::Local)
                .ok_or_else(|| missing_section("logs", "local")),
            "s3" => self
                .s3
                .as_ref()
                .map(LogDriverConfig::S3)
                .ok_or_else(|| missing_section("logs", "s3")),
            other => Err(crate::ConfigError::UnknownDriver {
                kind: "logs",
                driver: other.to_string(),
            }),
        }
    }
}

pub enum LogDriverConfig<'a> {
    Local(&'a LocalLogConfig),
    S3(&'a S3LogConfig),
}

fn missing_section(table: &'static str, driver: &'static str) -> crate::ConfigError {
    crate::ConfigError::UnknownDriver {
        kind: table,
        driver: format!("{driver} (selected but [{table}.{driver}] is absent)"),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalLogConfig {
    pub dir: String,
    pub link: String,
}

/// `key` accepts either `"access secret"` or `{access=..., secret=...}`
/// in the source TOML; normalized to this shape at deserialize time.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum S3Key {
    Inline(String),
    Split { access: String, secret: String },
}

impl S3Key {
    pub fn access_secret(&self) -> (String, String) {
        match self {
            S3Key::Inline(s) => {
                let mut parts = s.splitn(2, ' ');
                let access = parts.next().unwrap_or_default().to_string();
                let secret = parts.next().unwrap_or_default().to_string();
                (access, secret)
            }
            S3Key::Split { access, secret } => (access.clone(), secret.clone()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3LogConfig {
    pub url: String,
    #[serde(default)]
    pub proxy_url: Option<String>,
    pub key: S3Key,
    /// `x-amz-acl` header value sent on every upload. Supplemented
    /// from the original's `[logs.s3] acl=...` (SPEC_FULL.md §2.3).
    #[serde(default)]
    pub acl: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForgeConfig {
    pub driver: String,
    pub github: Option<GithubForgeConfig>,
}

impl ForgeConfig {
    pub fn resolve(&self) -> Result<ForgeDriverConfig<'_>, crate::ConfigError> {
        match self.driver.as_str() {
            "github" => self
                .github
                .as_ref()
                .map(ForgeDriverConfig::Github)
                .ok_or_else(|| missing_section("forge", "github")),
            other => Err(crate::ConfigError::UnknownDriver {
                kind: "forge",
                driver: other.to_string(),
            }),
        }
    }
}

pub enum ForgeDriverConfig<'a> {
    Github(&'a GithubForgeConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubForgeConfig {
    #[serde(rename = "clone-url")]
    pub clone_url: String,
    #[serde(rename = "api-url")]
    pub api_url: String,
    #[serde(rename = "content-url")]
    pub content_url: String,
    pub token: String,
    #[serde(default)]
    pub post: bool,
    /// Custom CA bundle for the forge HTTP session. Supplemented from
    /// the original's `create_http_session` (SPEC_FULL.md §2.4).
    #[serde(default)]
    pub ca: Option<String>,
    /// Supplemented from the original's `create_http_session`
    /// (SPEC_FULL.md §2.5).
    #[serde(default, rename = "user-agent")]
    pub user_agent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s3_key_accepts_inline_string() {
        let key: S3Key = serde_json::from_str("\"AKIA x secret y\"").unwrap();
        assert_eq!(key.access_secret(), ("AKIA".to_string(), "x secret y".to_string()));
    }

    #[test]
    fn s3_key_accepts_split_object() {
        let key: S3Key = serde_json::from_value(serde_json::json!({"access": "a", "secret": "s"})).unwrap();
        assert_eq!(key.access_secret(), ("a".to_string(), "s".to_string()));
    }

    #[test]
    fn logs_config_resolves_selected_driver_section() {
        let value = serde_json::json!({
            "driver": "local",
            "local": {"dir": "/tmp/x", "link": "http://x"},
        });
        let logs: LogsConfig = serde_json::from_value(value).unwrap();
        match logs.resolve().unwrap() {
            LogDriverConfig::Local(cfg) => assert_eq!(cfg.dir, "/tmp/x"),
            LogDriverConfig::S3(_) => panic!("expected local driver"),
        }
    }

    #[test]
    fn logs_config_errors_when_selected_section_absent() {
        let value = serde_json::json!({"driver": "s3", "local": null, "s3": null});
        let logs: LogsConfig = serde_json::from_value(value).unwrap();
        assert!(logs.resolve().is_err());
    }
}
