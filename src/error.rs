//! Centralized error types for mimestamp.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All errors produced by the mimestamp library.
#[derive(Error, Debug)]
pub enum StampError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A file to read does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The input cannot be parsed as a mail message.
    #[error("Input is not a parseable mail message: {0}")]
    ParseFailure(String),

    /// The image payload could not be read, so no image part can be built.
    #[error("Image resource '{path}' is unavailable: {reason}")]
    MissingResource { path: PathBuf, reason: String },

    /// A bounded read did not finish in time.
    #[error("Reading '{path}' did not finish within {timeout:?}")]
    Timeout { path: PathBuf, timeout: Duration },

    /// An HTML part carries a transfer encoding we cannot insert a reference into.
    #[error("Unsupported Content-Transfer-Encoding: {0}")]
    UnsupportedEncoding(String),

    /// The configuration file is unusable.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias for `Result<T, StampError>`.
pub type Result<T> = std::result::Result<T, StampError>;

impl StampError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
