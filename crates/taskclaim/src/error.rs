use std::path::PathBuf;

use thiserror::Error;

pub type TaskResult<T> = Result<T, TaskError>;

#[derive(Debug, Error)]
pub enum TaskError {
    /// The transport rejected the call or the remote returned an error.
    #[error("{service}/{method} failed: {message}")]
    Remote {
        service: &'static str,
        method: &'static str,
        message: String,
    },

    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}
