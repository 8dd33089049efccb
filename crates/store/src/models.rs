//! Document models.
//!
//! Identities, locators and version tags are thin newtypes over `String` so
//! they can't be mixed up at call sites. A [`Document`] is generic over its
//! payload: stores and caches deal in [`RawDocument`] (a JSON payload) and
//! callers convert to their own schema at the boundary.

use crate::error::{ErrorKind, Result};
use derive_more::Display;
use exn::ResultExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Address of a collection of documents.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionLocator(String);
impl CollectionLocator {
    /// Trailing slashes are trimmed; an empty locator is rejected.
    pub fn new(locator: impl Into<String>) -> Result<Self> {
        let locator = locator.into();
        let trimmed = locator.trim_end_matches('/');
        if trimmed.trim().is_empty() {
            exn::bail!(ErrorKind::InvalidLocator(locator));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Locator for the document `id` inside this collection.
    pub fn document(&self, id: &DocumentId) -> Locator {
        Locator(format!("{}/docs/{}", self.0, id.0))
    }
}

/// Identity of a document, unique within its collection and stable across
/// modifications.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(String);
impl DocumentId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            exn::bail!(ErrorKind::InvalidIdentity);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Self link of a single document. Stable for the document's lifetime.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator(String);
impl Locator {
    pub fn new(locator: impl Into<String>) -> Result<Self> {
        let locator = locator.into();
        if locator.trim().is_empty() {
            exn::bail!(ErrorKind::InvalidLocator(locator));
        }
        Ok(Self(locator))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Opaque version tag. Changes on every committed modification; equality is
/// the only meaningful comparison.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ETag(String);
impl ETag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A document as returned by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document<T = Value> {
    pub id: DocumentId,
    pub etag: ETag,
    pub locator: Locator,
    pub collection: CollectionLocator,
    pub payload: T,
}

/// Document with an untyped JSON payload, as stored and cached.
pub type RawDocument = Document<Value>;

impl RawDocument {
    /// Deserialize the payload into the caller's schema.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<Document<T>> {
        let payload = serde_json::from_value(self.payload).or_raise(|| ErrorKind::InvalidData)?;
        Ok(Document {
            id: self.id,
            etag: self.etag,
            locator: self.locator,
            collection: self.collection,
            payload,
        })
    }
}

impl<T: Serialize> Document<T> {
    pub fn into_raw(self) -> Result<RawDocument> {
        let payload = serde_json::to_value(&self.payload).or_raise(|| ErrorKind::InvalidData)?;
        Ok(Document {
            id: self.id,
            etag: self.etag,
            locator: self.locator,
            collection: self.collection,
            payload,
        })
    }
}

/// Outcome of an If-None-Match read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionalRead {
    /// The remote tag still equals the one supplied.
    NotModified,
    /// The remote copy differs; here it is.
    Modified(RawDocument),
}
