use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use revalidate_cache::{CacheHandle, CacheKey};
use revalidate_store::error::{Error as StoreError, ErrorKind as StoreErrorKind};
use revalidate_store::{CollectionLocator, ConditionalRead, Document, DocumentId, RawDocument, StoreHandle};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

/// How a document was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Cache hit, and the remote store confirmed the cached version tag is
    /// still current. No payload was transferred.
    Unchanged,
    /// Cache hit, but the remote copy had moved on; the cache now holds it.
    Refreshed,
    /// Cache miss; found by an unconditional lookup and cached.
    Loaded,
}

/// Cache-aside reader that revalidates cached documents with their version
/// tag instead of re-downloading them.
///
/// Every call costs exactly one remote operation: a conditional read when the
/// document is cached, an identity lookup when it isn't. The cache is only
/// written after that operation succeeds, so a failed call never leaves a
/// partial update behind.
///
/// The cache is not invalidated by writes made elsewhere. A document replaced
/// by another client is picked up by the next call for that identity, not
/// before.
///
/// Concurrent calls for the same key are not coordinated: two callers that
/// both miss will both look the document up, and the last one to finish
/// wins the cache slot. Either value is a valid snapshot.
///
/// # Examples
///
/// ```
/// use revalidate_cache::MemoryCache;
/// use revalidate_client::RevalidatingClient;
/// use revalidate_store::backend::MemoryStore;
/// use revalidate_store::{CollectionLocator, DocumentId};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let customers = CollectionLocator::new("dbs/demo/colls/customers")?;
/// let store = MemoryStore::with_documents(&customers, [("c1", json!({"name": "Demo"}))]);
/// let client = RevalidatingClient::new(Arc::new(store), Arc::new(MemoryCache::new()));
///
/// let id = DocumentId::new("c1")?;
/// let first = client.get_document_by_id(&customers, &id).await?;
/// // Second call revalidates the cached copy instead of fetching it again.
/// let second = client.get_document_by_id(&customers, &id).await?;
/// assert_eq!(first, second);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RevalidatingClient {
    store: StoreHandle,
    cache: CacheHandle,
}

impl RevalidatingClient {
    pub fn new(store: StoreHandle, cache: CacheHandle) -> Self {
        Self { store, cache }
    }

    /// Build an HTTP-backed client with retrying reads and an empty cache.
    #[cfg(feature = "http")]
    pub fn from_config(config: &revalidate_config::Config) -> Result<Self> {
        use revalidate_cache::MemoryCache;
        use revalidate_store::backend::{HttpStore, RetryPolicy, RetryingStore};
        use std::sync::Arc;

        let http = HttpStore::new(
            &config.store.name,
            &config.store.endpoint,
            config.store.token.clone(),
            config.store.timeout(),
        )
        .or_raise(|| ErrorKind::Store)?;
        let policy = RetryPolicy {
            max_attempts: config.retry.max_attempts,
            base_backoff: config.retry.base_backoff(),
            max_backoff: config.retry.max_backoff(),
            attempt_timeout: config.retry.attempt_timeout(),
        };
        let store: StoreHandle = Arc::new(RetryingStore::new(Arc::new(http), policy));
        Ok(Self::new(store, Arc::new(MemoryCache::new())))
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn cache(&self) -> &CacheHandle {
        &self.cache
    }

    /// Fetch a document by identity, reusing the cached copy when the remote
    /// store reports it unmodified.
    ///
    /// # Errors
    /// - [`TransientRemoteFailure`](ErrorKind::TransientRemoteFailure) when
    ///   the store is unreachable or times out.
    /// - [`PreconditionRejected`](ErrorKind::PreconditionRejected) when a
    ///   cached document can no longer be revalidated (e.g. it was deleted).
    /// - [`NotFound`](ErrorKind::NotFound) when nothing has this identity.
    pub async fn get_document_by_id(&self, collection: &CollectionLocator, id: &DocumentId) -> Result<RawDocument> {
        let (document, _) = self.get_document_with_outcome(collection, id).await?;
        Ok(document)
    }

    /// Same as [`get_document_by_id()`](Self::get_document_by_id), also
    /// reporting which path produced the document.
    #[instrument(skip_all, fields(store = self.store.name(), collection = %collection, id = %id))]
    pub async fn get_document_with_outcome(
        &self,
        collection: &CollectionLocator,
        id: &DocumentId,
    ) -> Result<(RawDocument, Outcome)> {
        let key = CacheKey::new(collection, id);
        let (fresh, outcome) = match self.cache.get(&key).await {
            Some(cached) => match self.store.conditional_read(&cached.locator, &cached.etag).await {
                Ok(ConditionalRead::NotModified) => {
                    debug!(etag = %cached.etag, "Cached document is current");
                    return Ok((cached, Outcome::Unchanged));
                },
                Ok(ConditionalRead::Modified(fresh)) => {
                    debug!(cached = %cached.etag, current = %fresh.etag, "Cached document is stale");
                    (fresh, Outcome::Refreshed)
                },
                Err(e) => return Err(classify(e, ErrorKind::PreconditionRejected)),
            },
            None => match self.store.find_by_id(collection, id).await {
                Ok(Some(fresh)) => {
                    debug!(etag = %fresh.etag, "Loaded document");
                    (fresh, Outcome::Loaded)
                },
                Ok(None) => exn::bail!(ErrorKind::NotFound(key.to_string())),
                Err(e) => return Err(classify(e, ErrorKind::Store)),
            },
        };
        self.cache.set(key, fresh.clone()).await;
        Ok((fresh, outcome))
    }

    /// Fetch a document and deserialize its payload into `T`.
    ///
    /// The cache holds the raw document either way; a schema mismatch only
    /// fails this call.
    pub async fn get_typed<T: DeserializeOwned>(
        &self,
        collection: &CollectionLocator,
        id: &DocumentId,
    ) -> Result<Document<T>> {
        self.get_document_by_id(collection, id).await?.into_typed().or_raise(|| ErrorKind::InvalidData)
    }
}

/// Raise a store failure as a client error, keeping the store frame as the
/// cause. `fallback` applies to anything that isn't transient or bad data.
fn classify(err: StoreError, fallback: ErrorKind) -> Error {
    let kind = match &*err {
        e if e.is_retryable() => ErrorKind::TransientRemoteFailure,
        StoreErrorKind::InvalidData => ErrorKind::InvalidData,
        _ => fallback,
    };
    err.raise(kind)
}
