//! TOML + JSON-merge-patch configuration loading.
//!
//! Configuration is modeled as a `serde_json::Value` tree (spec.md §9's
//! "tagged-variant JSON-value type, pattern matched") so that TOML
//! documents from different sources can be merged with RFC 7396
//! semantics before being deserialized into the typed [`Config`].

mod error;
mod merge;
mod sections;
mod source;

pub use error::ConfigError;
pub use merge::json_merge_patch;
pub use sections::{
    ContainerConfig, ForgeConfig, ForgeDriverConfig, GithubForgeConfig, LocalLogConfig,
    LogDriverConfig, LogsConfig, S3Key, S3LogConfig,
};
pub use source::{ConfigSource, Loader};

use serde::Deserialize;

/// The job runner's top-level configuration (spec.md §6.2).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub container: ContainerConfig,
    pub logs: LogsConfig,
    pub forge: ForgeConfig,
}

impl Config {
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value).map_err(ConfigError::Schema)
    }
}
