//! Configuration source precedence (spec.md §6.2): the built-in
//! baseline, then exactly one of a command-line path,
//! `$JOB_RUNNER_CONFIG`, or the user config path (missing-ok).
//!
//! Ported from `JobContext.__init__`/`load_config` in
//! `lib/aio/jobcontext.py`.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::ConfigError;
use crate::merge::{json_merge_patch, load_external_files, toml_to_json};

const BUILTIN_DEFAULT_TOML: &str = include_str!("default.toml");
const JOB_RUNNER_CONFIG_ENV: &str = "JOB_RUNNER_CONFIG";

/// Which of the three precedence sources supplied the override layer.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    CommandLine(PathBuf),
    Environment(PathBuf),
    User(PathBuf),
}

pub struct Loader {
    value: Value,
}

impl Loader {
    /// Load the built-in baseline, then merge in exactly one override
    /// layer chosen by `explicit_path` / `$JOB_RUNNER_CONFIG` / the
    /// supplied user config path.
    pub fn load(explicit_path: Option<&Path>, user_config_path: &Path) -> Result<Self, ConfigError> {
        let builtin = parse_toml_str(BUILTIN_DEFAULT_TOML, Path::new("<built-in>"))?;
        let mut value = builtin;

        let source = if let Some(path) = explicit_path {
            ConfigSource::CommandLine(path.to_path_buf())
        } else if let Ok(path) = std::env::var(JOB_RUNNER_CONFIG_ENV) {
            ConfigSource::Environment(PathBuf::from(path))
        } else {
            ConfigSource::User(user_config_path.to_path_buf())
        };

        let missing_ok = matches!(source, ConfigSource::User(_));
        let path = match &source {
            ConfigSource::CommandLine(p) | ConfigSource::Environment(p) | ConfigSource::User(p) => p.clone(),
        };

        tracing::debug!(?path, missing_ok, "loading configuration layer");
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let layer = parse_toml_str(&contents, &path)?;
                let layer = load_external_files(layer, path.parent().unwrap_or_else(|| Path::new(".")))?;
                value = json_merge_patch(value, layer);
            }
            Err(err) if missing_ok && err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(?path, "no configuration found at this path, continuing with baseline");
            }
            Err(err) => {
                return Err(ConfigError::Io { path, source: err });
            }
        }

        Ok(Self { value })
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

fn parse_toml_str(contents: &str, path: &Path) -> Result<Value, ConfigError> {
    let parsed: toml::Value = toml::from_str(contents).map_err(|source| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml_to_json(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_user_config_falls_back_to_builtin_only() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist.toml");
        let loader = Loader::load(None, &missing).unwrap();
        let value = loader.into_value();
        assert_eq!(value["container"]["default-image"], "quay.io/cockpit/tasks");
    }

    #[test]
    fn explicit_path_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job-runner.toml");
        std::fs::write(&path, "[container]\ndefault-image = \"custom/image\"\n").unwrap();
        let loader = Loader::load(Some(&path), &dir.path().join("unused.toml")).unwrap();
        let value = loader.into_value();
        assert_eq!(value["container"]["default-image"], "custom/image");
        // unrelated builtin keys survive the merge.
        assert_eq!(value["forge"]["driver"], "github");
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = Loader::load(Some(&missing), &dir.path().join("unused.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
