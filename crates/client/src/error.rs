//! Client Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Store failures are kept as child frames, so the
//! original cause (status code, timeout, missing document) stays inspectable.

use derive_more::{Display, Error};

/// A client error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong while resolving a document.
///
/// The client performs no recovery of its own: every failure surfaces to the
/// caller, and the cache is left exactly as it was before the call.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The remote store could not be reached, or didn't answer in time.
    /// Calling again may succeed.
    #[display("remote store temporarily unavailable")]
    TransientRemoteFailure,
    /// The conditional read was refused for a reason other than a version
    /// mismatch, typically because the cached document has since been deleted
    /// or moved. The stale cache entry is left in place.
    #[display("conditional read rejected")]
    PreconditionRejected,
    /// Nothing in the collection has this identity. Absence is never cached.
    #[display("document not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The document payload doesn't match the requested schema.
    #[display("invalid document data")]
    InvalidData,
    /// Any other store failure during an unconditional lookup.
    #[display("document store error")]
    Store,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientRemoteFailure)
    }
}
