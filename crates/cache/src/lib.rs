//! In-process document cache.
//!
//! The cache is never the source of truth; the remote store is. Entries are
//! keyed by collection and document identity, hold the full document
//! (payload, version tag and locator) and live until the cache is dropped.
//! There is no eviction and nothing is persisted.

mod memory;

pub use crate::memory::MemoryCache;
use async_trait::async_trait;
use revalidate_store::{CollectionLocator, DocumentId, RawDocument};
use std::fmt;
use std::sync::Arc;

pub type CacheHandle = Arc<dyn DocumentCache + Send + Sync>;

/// Identifies a cached document: at most one entry exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub collection: CollectionLocator,
    pub id: DocumentId,
}
impl CacheKey {
    pub fn new(collection: &CollectionLocator, id: &DocumentId) -> Self {
        Self { collection: collection.clone(), id: id.clone() }
    }
}
impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.collection, self.id)
    }
}

/// Key-value store for documents.
///
/// `get` reports a hit or a miss, `set` unconditionally replaces whatever is
/// stored under the key. Implementations must be safe to share between
/// concurrent callers.
#[async_trait]
pub trait DocumentCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Option<RawDocument>;

    async fn set(&self, key: CacheKey, document: RawDocument);

    /// Number of entries.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        let key = CacheKey::new(
            &CollectionLocator::new("dbs/demo/colls/customers").unwrap(),
            &DocumentId::new("c1").unwrap(),
        );
        assert_eq!(key.to_string(), "dbs/demo/colls/customers:c1");
    }
}
