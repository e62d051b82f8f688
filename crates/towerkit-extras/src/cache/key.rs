//! Cache key helpers

use sha2::{Digest, Sha256};

/// Prefix of page cache keys
pub const PAGE_CACHE_PREFIX: &str = "page";

/// Keys longer than this are replaced by their digest
const MAX_KEY_LEN: usize = 200;

/// Join `prefix` and `key` as `prefix:key`.
///
/// A `key` longer than 200 bytes is replaced by its SHA-256 hex digest so
/// that store keys stay bounded.
pub fn generate_key_with_prefix(prefix: &str, key: &str) -> String {
    if key.len() > MAX_KEY_LEN {
        let digest = Sha256::digest(key.as_bytes());
        format!("{}:{:x}", prefix, digest)
    } else {
        format!("{}:{}", prefix, key)
    }
}

/// Default key: `GET` requests only, keyed by the escaped path and query
pub fn request_uri_key(parts: &http::request::Parts) -> Option<String> {
    if parts.method != http::Method::GET {
        return None;
    }
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Some(generate_key_with_prefix(
        PAGE_CACHE_PREFIX,
        &urlencoding::encode(target),
    ))
}
