//! Cache-aside document reads with ETag revalidation.
//!
//! [`RevalidatingClient`] sits between callers and a remote
//! [`DocumentStore`](revalidate_store::DocumentStore). Documents it has seen
//! before are revalidated with an If-None-Match read and served from the
//! [`DocumentCache`](revalidate_cache::DocumentCache) when unchanged; anything
//! else is fetched in full and cached.

mod client;
pub mod error;

pub use crate::client::{Outcome, RevalidatingClient};
