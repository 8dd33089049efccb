pub mod backend;
pub mod error;
mod models;

pub use crate::backend::DocumentStore;
pub use crate::models::{CollectionLocator, ConditionalRead, Document, DocumentId, ETag, Locator, RawDocument};
use std::sync::Arc;

pub type StoreHandle = Arc<dyn DocumentStore + Send + Sync>;
