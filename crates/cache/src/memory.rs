use crate::{CacheKey, DocumentCache};
use async_trait::async_trait;
use revalidate_store::RawDocument;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Unbounded in-memory cache.
///
/// Documents are stored in a `HashMap` behind a [`RwLock`]; the lock is only
/// held for the map operation itself, never across a remote call.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, RawDocument>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Option<RawDocument> {
        self.entries.read().await.get(key).cloned()
    }

    async fn set(&self, key: CacheKey, document: RawDocument) {
        tracing::trace!(%key, etag = %document.etag, "Caching document");
        self.entries.write().await.insert(key, document);
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
