//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::probe::ProbeError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {op} ({}): {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The connection id supplied with a request has no live push channel.
    #[error("Socket connection not found: {0}")]
    ConnectionNotFound(String),

    /// The source file referenced by a request does not exist.
    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn connection_not_found(channel_id: impl Into<String>) -> Self {
        Self::ConnectionNotFound(channel_id.into())
    }
}
