//! Document store trait and implementations.
//!
//! This module defines the `DocumentStore` trait, the contract a remote
//! document service must fulfil for cache revalidation: point reads guarded
//! by an If-None-Match version tag, an unconditional lookup by identity, and
//! If-Match guarded writes that mint a new version tag every time.

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "mock")]
mod memory;
mod retry;

#[cfg(feature = "http")]
pub use self::http::HttpStore;
#[cfg(feature = "mock")]
pub use self::memory::{CallCounts, MemoryStore};
pub use self::retry::{RetryPolicy, RetryingStore};
use crate::error::Result;
use crate::models::{CollectionLocator, ConditionalRead, DocumentId, ETag, Locator, RawDocument};
use async_trait::async_trait;
use serde_json::Value;

/// Unified interface for remote document stores.
///
/// All operations are asynchronous; each call is at most one round trip to
/// the remote service. Implementations must guarantee that every successful
/// write produces a version tag that has never been handed out before for
/// that document.
///
/// # Examples
///
/// ```
/// use revalidate_store::{DocumentStore, ConditionalRead, RawDocument, error::Result};
///
/// async fn refresh(store: &dyn DocumentStore, cached: RawDocument) -> Result<RawDocument> {
///     match store.conditional_read(&cached.locator, &cached.etag).await? {
///         ConditionalRead::NotModified => Ok(cached),
///         ConditionalRead::Modified(fresh) => Ok(fresh),
///     }
/// }
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Name of the configured store, used for logging only.
    fn name(&self) -> &str;

    /// Read the document at `locator` unless its current version tag equals
    /// `if_none_match`.
    ///
    /// Returns [`ConditionalRead::NotModified`] exactly when the tags are
    /// equal. Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the
    /// document no longer exists.
    async fn conditional_read(&self, locator: &Locator, if_none_match: &ETag) -> Result<ConditionalRead>;

    /// Look a document up by identity within a collection, without any
    /// precondition. The first match wins.
    async fn find_by_id(&self, collection: &CollectionLocator, id: &DocumentId) -> Result<Option<RawDocument>>;

    /// Replace the payload of the document at `locator`, provided its current
    /// version tag still equals `if_match`.
    ///
    /// Returns [`Conflict`](crate::error::ErrorKind::Conflict) when the tag
    /// has moved on, and [`NotFound`](crate::error::ErrorKind::NotFound) when
    /// the document is gone.
    async fn replace(&self, locator: &Locator, payload: Value, if_match: &ETag) -> Result<RawDocument>;

    /// Create a new document in a collection.
    ///
    /// Returns [`AlreadyExists`](crate::error::ErrorKind::AlreadyExists) if
    /// the identity is taken.
    async fn create(&self, collection: &CollectionLocator, id: &DocumentId, payload: Value) -> Result<RawDocument>;

    /// Delete the document at `locator`.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the
    /// document does not exist.
    async fn delete(&self, locator: &Locator) -> Result<()>;
}
