//! In-memory document store for testing.

use crate::error::{ErrorKind, Result};
use crate::models::{CollectionLocator, ConditionalRead, Document, DocumentId, ETag, Locator, RawDocument};
use crate::DocumentStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Number of calls received per operation, failed calls included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub conditional_reads: usize,
    pub lookups: usize,
    pub replaces: usize,
    pub creates: usize,
    pub deletes: usize,
}

#[derive(Default)]
struct Counters {
    conditional_reads: AtomicUsize,
    lookups: AtomicUsize,
    replaces: AtomicUsize,
    creates: AtomicUsize,
    deletes: AtomicUsize,
}

#[derive(Default)]
struct State {
    /// Store-wide, so a tag is never reused even after delete and re-create.
    next_tag: u64,
    documents: HashMap<Locator, RawDocument>,
}
impl State {
    fn mint(&mut self) -> ETag {
        let tag = ETag::new(format!("v{}", self.next_tag));
        self.next_tag += 1;
        tag
    }
}

/// In-memory document store for testing.
///
/// Version tags come from one counter shared by the whole store (`v0`, `v1`,
/// ...), so a tag is never handed out twice, not even to a document that was
/// deleted and created again. Each trait method bumps its own entry in
/// [`calls()`](Self::calls), which lets tests tell a conditional read from an
/// identity lookup. [`fail_next()`](Self::fail_next) makes the next calls
/// fail as if the remote were unreachable.
///
/// # Examples
///
/// ```
/// use revalidate_store::backend::MemoryStore;
/// use revalidate_store::{CollectionLocator, DocumentId, DocumentStore};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let customers = CollectionLocator::new("dbs/demo/colls/customers")?;
/// let store = MemoryStore::with_documents(&customers, [("c1", json!({"name": "Demo"}))]);
///
/// let found = store.find_by_id(&customers, &DocumentId::new("c1")?).await?;
/// assert_eq!(found.map(|d| d.etag.to_string()), Some("v0".to_string()));
/// # Ok(())
/// # }
/// ```
pub struct MemoryStore {
    name: String,
    state: RwLock<State>,
    counters: Counters,
    failures: AtomicUsize,
}

impl MemoryStore {
    /// Create a store pre-populated with documents in one collection.
    ///
    /// Panics if any identity is empty. If test setup is wrong, then test
    /// should not pass.
    pub fn with_documents(
        collection: &CollectionLocator,
        documents: impl IntoIterator<Item = (impl Into<String>, Value)>,
    ) -> Self {
        let mut state = State::default();
        for (id, payload) in documents {
            let Ok(id) = DocumentId::new(id) else {
                panic!("MemoryStore::with_documents: empty document identity");
            };
            let document = Document {
                locator: collection.document(&id),
                etag: state.mint(),
                collection: collection.clone(),
                id,
                payload,
            };
            state.documents.insert(document.locator.clone(), document);
        }
        Self {
            name: "memory".to_string(),
            state: RwLock::new(state),
            counters: Counters::default(),
            failures: AtomicUsize::new(0),
        }
    }

    /// Change the name of the store.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Snapshot of the call counters.
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            conditional_reads: self.counters.conditional_reads.load(Ordering::SeqCst),
            lookups: self.counters.lookups.load(Ordering::SeqCst),
            replaces: self.counters.replaces.load(Ordering::SeqCst),
            creates: self.counters.creates.load(Ordering::SeqCst),
            deletes: self.counters.deletes.load(Ordering::SeqCst),
        }
    }

    /// Fail the next `calls` operations (of any kind) with a
    /// [`Network`](ErrorKind::Network) error.
    pub fn fail_next(&self, calls: usize) {
        self.failures.store(calls, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<()> {
        let failed = self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok();
        if failed {
            exn::bail!(ErrorKind::Network(format!("{} unreachable", self.name)));
        }
        Ok(())
    }
}
impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            name: "memory".to_string(),
            state: RwLock::new(State::default()),
            counters: Counters::default(),
            failures: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn conditional_read(&self, locator: &Locator, if_none_match: &ETag) -> Result<ConditionalRead> {
        self.counters.conditional_reads.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        let guard = self.state.read().await;
        let current = guard
            .documents
            .get(locator)
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(locator.to_string())))?;
        match &current.etag == if_none_match {
            true => Ok(ConditionalRead::NotModified),
            false => Ok(ConditionalRead::Modified(current.clone())),
        }
    }

    async fn find_by_id(&self, collection: &CollectionLocator, id: &DocumentId) -> Result<Option<RawDocument>> {
        self.counters.lookups.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        Ok(self.state.read().await.documents.get(&collection.document(id)).cloned())
    }

    async fn replace(&self, locator: &Locator, payload: Value, if_match: &ETag) -> Result<RawDocument> {
        self.counters.replaces.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        let mut guard = self.state.write().await;
        let current_tag = match guard.documents.get(locator) {
            Some(current) => current.etag.clone(),
            None => exn::bail!(ErrorKind::NotFound(locator.to_string())),
        };
        if &current_tag != if_match {
            exn::bail!(ErrorKind::Conflict(format!("{locator}: expected {if_match}, found {current_tag}")));
        }
        let etag = guard.mint();
        let Some(document) = guard.documents.get_mut(locator) else {
            exn::bail!(ErrorKind::NotFound(locator.to_string()));
        };
        document.etag = etag;
        document.payload = payload;
        Ok(document.clone())
    }

    async fn create(&self, collection: &CollectionLocator, id: &DocumentId, payload: Value) -> Result<RawDocument> {
        self.counters.creates.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        let locator = collection.document(id);
        let mut guard = self.state.write().await;
        if guard.documents.contains_key(&locator) {
            exn::bail!(ErrorKind::AlreadyExists(locator.to_string()));
        }
        let document = Document {
            id: id.clone(),
            etag: guard.mint(),
            locator: locator.clone(),
            collection: collection.clone(),
            payload,
        };
        guard.documents.insert(locator, document.clone());
        Ok(document)
    }

    async fn delete(&self, locator: &Locator) -> Result<()> {
        self.counters.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        self.state
            .write()
            .await
            .documents
            .remove(locator)
            .map(|_| ())
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(locator.to_string())))
    }
}
