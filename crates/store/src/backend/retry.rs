//! Retrying store decorator.
//!
//! Wraps another store and retries the read operations when they fail with a
//! retryable error, backing off exponentially between attempts. Writes are
//! forwarded untouched: an If-Match write that timed out may already have
//! committed, and retrying it would report a spurious conflict.

use crate::error::{ErrorKind, Result};
use crate::models::{CollectionLocator, ConditionalRead, DocumentId, ETag, Locator, RawDocument};
use crate::{DocumentStore, StoreHandle};
use async_trait::async_trait;
use exn::ResultExt;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// How hard to try before giving up on a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for every retry after that.
    pub base_backoff: Duration,
    /// Upper bound for a single delay.
    pub max_backoff: Duration,
    /// Abandon a single attempt after this long.
    pub attempt_timeout: Option<Duration>,
}
impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            attempt_timeout: None,
        }
    }
}
impl RetryPolicy {
    /// Delay before retry number `retry` (starting at 1).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Store decorator that retries transient read failures.
///
/// Only [`conditional_read()`](DocumentStore::conditional_read) and
/// [`find_by_id()`](DocumentStore::find_by_id) are retried, and only for
/// errors where [`is_retryable()`](ErrorKind::is_retryable) holds. Each retry
/// logs a [`warn event`](tracing::Event).
#[derive(Clone)]
pub struct RetryingStore {
    inner: StoreHandle,
    policy: RetryPolicy,
}
impl RetryingStore {
    pub fn new(inner: StoreHandle, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn attempt<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match self.policy.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, call()).await {
                    Ok(result) => result,
                    Err(elapsed) => Err(elapsed).or_raise(|| ErrorKind::Timeout),
                },
                None => call().await,
            };
            match result {
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let kind: &ErrorKind = &e;
                    let backoff = self.policy.backoff(attempt);
                    tracing::warn!(
                        store = self.inner.name(),
                        operation,
                        error = %kind,
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "Retrying store operation"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                },
                other => return other,
            }
        }
    }
}

#[async_trait]
impl DocumentStore for RetryingStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn conditional_read(&self, locator: &Locator, if_none_match: &ETag) -> Result<ConditionalRead> {
        self.attempt("conditional_read", move || self.inner.conditional_read(locator, if_none_match)).await
    }

    async fn find_by_id(&self, collection: &CollectionLocator, id: &DocumentId) -> Result<Option<RawDocument>> {
        self.attempt("find_by_id", move || self.inner.find_by_id(collection, id)).await
    }

    async fn replace(&self, locator: &Locator, payload: Value, if_match: &ETag) -> Result<RawDocument> {
        self.inner.replace(locator, payload, if_match).await
    }

    async fn create(&self, collection: &CollectionLocator, id: &DocumentId, payload: Value) -> Result<RawDocument> {
        self.inner.create(collection, id, payload).await
    }

    async fn delete(&self, locator: &Locator) -> Result<()> {
        self.inner.delete(locator).await
    }
}
