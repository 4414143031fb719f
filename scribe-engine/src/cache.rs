//! Shared execution cache
//!
//! Keyed, TTL-bound store used by the data-processing stage to memoize
//! expensive fetches across pipeline runs. Keys are caller-namespaced
//! (pipeline path + logical key) to prevent cross-pipeline collisions.
//! Expiry is checked lazily on read; an expired entry reads as absent and
//! is evicted on access, never proactively swept.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct CacheEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if now >= deadline)
    }
}

/// Process-wide cache shared across workers and pipelines
///
/// Entries are independent; a single mutex over the map is enough, no
/// cross-key coordination happens.
#[derive(Default)]
pub struct CacheStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a key, evicting it if its TTL has passed
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().unwrap();
        let expired = entries
            .get(key)
            .map(|entry| entry.is_expired(Instant::now()))?;

        if expired {
            entries.remove(key);
            return None;
        }

        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Stores a value; `ttl = None` means no expiry
    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Option<Duration>) {
        let entry = CacheEntry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.lock().unwrap().insert(key.into(), entry);
    }

    /// Returns a handle that prefixes every key with a namespace
    pub fn scoped(self: &Arc<Self>, namespace: impl Into<String>) -> ScopedCache {
        ScopedCache {
            store: Arc::clone(self),
            namespace: namespace.into(),
        }
    }

    #[cfg(test)]
    fn contains_raw(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }
}

/// Pipeline-scoped view of the shared cache
///
/// Handed to processor sandboxes so scripts under different pipelines can
/// never collide on a logical key.
#[derive(Clone)]
pub struct ScopedCache {
    store: Arc<CacheStore>,
    namespace: String,
}

impl ScopedCache {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.get(&self.qualify(key))
    }

    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        self.store.set(self.qualify(key), value, ttl);
    }

    fn qualify(&self, key: &str) -> String {
        format!("{}::{}", self.namespace, key)
    }
}
