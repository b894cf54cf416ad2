#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    TomlParse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("external config file {0:?} is not valid UTF-8")]
    ExternalFileNotUtf8(std::path::PathBuf),

    #[error("configuration does not match expected schema: {0}")]
    Schema(#[source] serde_json::Error),

    #[error("unknown {kind} driver {driver:?}")]
    UnknownDriver { kind: &'static str, driver: String },
}
