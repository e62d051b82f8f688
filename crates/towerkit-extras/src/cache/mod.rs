//! Response caching.
//!
//! [`CacheLayer`] computes a key for each request. On a hit the stored
//! response is replayed without calling the inner service. On a miss the
//! inner service runs and a `2xx` response is buffered and written to the
//! [`Store`] with the configured TTL.
//!
//! Concurrent misses for the same key all reach the inner service. The last
//! write wins.
//!
//! ```rust
//! use std::time::Duration;
//! use towerkit_extras::cache::{
//!     generate_key_with_prefix, CacheLayer, MemoryStore, PAGE_CACHE_PREFIX,
//! };
//!
//! let layer = CacheLayer::new(MemoryStore::new(), Duration::from_secs(60))
//!     .key_fn(|parts| {
//!         let user = parts.headers.get("x-user")?.to_str().ok()?;
//!         let key = format!("{}:{}", user, parts.uri.path());
//!         Some(generate_key_with_prefix(PAGE_CACHE_PREFIX, &key))
//!     });
//! # let _ = layer;
//! ```

mod key;
mod layer;
mod store;

pub use key::{generate_key_with_prefix, request_uri_key, PAGE_CACHE_PREFIX};
pub use layer::{Cache, CacheConfig, CacheLayer, CachedResponse, KeyFn};
pub use store::{MemoryStore, Store};
