//! On-disk response cache.
//!
//! Responses are addressed by a [`CacheKey`], a digest over everything that
//! makes a request unique. The [`CacheStore`] is best-effort: callers log
//! its errors and carry on as if caching was disabled for that operation.

mod key;
mod store;

pub use key::CacheKey;
pub use store::{CacheEntry, CacheStore};
