//! Store Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Each remote failure is classified into something the
//! caller can act on.

use derive_more::{Display, Error};

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Document does not exist
    #[display("document not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Document with the same identity already exists in the collection
    #[display("document already exists: {_0}")]
    AlreadyExists(#[error(not(source))] String),
    /// If-Match precondition failed; someone else wrote first
    #[display("version conflict: {_0}")]
    Conflict(#[error(not(source))] String),
    /// Access denied (credentials)
    #[display("permission denied")]
    PermissionDenied,
    /// Connectivity problem or a transient server-side failure
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The remote call did not complete in time
    #[display("request timed out")]
    Timeout,
    /// Locator is empty or otherwise unusable
    #[display("invalid locator: {_0:?}")]
    InvalidLocator(#[error(not(source))] String),
    /// Document identity is empty
    #[display("invalid document identity")]
    InvalidIdentity,
    /// Payload could not be (de)serialized
    #[display("invalid document data")]
    InvalidData,
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout)
    }
}
