//! Config Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration loading.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// An explicitly requested configuration file does not exist.
    #[display("config file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// File extension is not one of `toml`, `yaml`, `yml` or `json`.
    #[display("unsupported config format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// Sources could not be merged or deserialized.
    #[display("config could not be parsed")]
    Parse,
    /// Parsed, but the values make no sense.
    #[display("invalid config: {_0}")]
    Invalid(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
