//! Cache store abstraction.
//!
//! The storage engine is external to the dispatch engine; `CacheStore` is
//! the seam it plugs into. `MemoryCacheStore` ships for tests and
//! single-process deployments.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Serializable stored response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

/// External cache store contract: `get`/`set`/`delete_pattern`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<CachedResponse>;
    async fn set(&self, key: &str, value: CachedResponse, ttl: Duration);
    /// Remove every key matching the glob (`*` suffix wildcard only).
    async fn delete_pattern(&self, pattern: &str);
}

/// In-memory store with lazy expiry.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, (CachedResponse, Instant)>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Option<CachedResponse> {
        let expired = match self.entries.get(key) {
            Some(entry) => {
                if Instant::now() < entry.1 {
                    return Some(entry.0.clone());
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    async fn set(&self, key: &str, value: CachedResponse, ttl: Duration) {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
    }

    async fn delete_pattern(&self, pattern: &str) {
        if let Some(prefix) = pattern.strip_suffix('*') {
            self.entries.retain(|k, _| !k.starts_with(prefix));
        } else {
            self.entries.remove(pattern);
        }
    }
}
