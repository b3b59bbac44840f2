//! Persistent TTL cache with lazy expiry.
//!
//! Best-effort: the cache is never authoritative, so persistence
//! failures are logged and swallowed rather than surfaced to callers. Reads
//! treat corrupt and expired entries as absent and purge them on the spot.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::kv::KvStore;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

const CACHE_PREFIX: &str = "wx-cache:";

/// One cached value with its write time and lifetime.
///
/// Valid while `now - timestamp <= ttl` (both in epoch milliseconds);
/// anything else is treated as absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: i64,
    pub ttl: i64,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self, now: i64) -> bool {
        now - self.timestamp > self.ttl
    }
}

/// Durable key-value cache with per-entry expiry.
#[derive(Clone)]
pub struct TtlCache {
    store: Arc<KvStore>,
    default_ttl: Duration,
}

impl TtlCache {
    pub fn new(store: Arc<KvStore>) -> Self {
        Self {
            store,
            default_ttl: DEFAULT_TTL,
        }
    }

    pub fn with_default_ttl(store: Arc<KvStore>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Store `value` under `key` with the default TTL.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Store `value` under `key` with an explicit TTL.
    ///
    /// Never fails to the caller; persistence errors are logged and dropped.
    pub fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let entry = CacheEntry {
            data: value,
            timestamp: chrono::Utc::now().timestamp_millis(),
            ttl: ttl.as_millis() as i64,
        };

        let json = match serde_json::to_string(&entry) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(key, "failed to serialize cache entry: {}", e);
                return;
            }
        };

        if let Err(e) = self.store.set_raw(&Self::namespaced(key), &json) {
            tracing::warn!(key, "failed to persist cache entry: {}", e);
        }
    }

    /// Read the value stored under `key`.
    ///
    /// Returns `None` if the entry is absent, corrupt, or expired. Corrupt
    /// and expired entries are removed as a side effect.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full_key = Self::namespaced(key);
        let raw = match self.store.get_raw(&full_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, "failed to read cache entry: {}", e);
                return None;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(key, "corrupt cache entry, removing: {}", e);
                self.remove(key);
                return None;
            }
        };

        if entry.is_expired(chrono::Utc::now().timestamp_millis()) {
            tracing::debug!(key, "cache entry expired, removing");
            self.remove(key);
            return None;
        }

        Some(entry.data)
    }

    /// Delete the entry under `key` unconditionally.
    pub fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove(&Self::namespaced(key)) {
            tracing::warn!(key, "failed to remove cache entry: {}", e);
        }
    }

    /// Delete every cache entry, leaving other namespaces untouched.
    pub fn clear(&self) {
        match self.store.remove_prefix(CACHE_PREFIX) {
            Ok(removed) => tracing::debug!(removed, "cleared weather cache"),
            Err(e) => tracing::warn!("failed to clear cache: {}", e),
        }
    }

    /// Remove every expired or corrupt entry; returns the number removed.
    ///
    /// Intended to run opportunistically (e.g. on app start) to bound growth,
    /// since expiry is otherwise only checked lazily on read.
    pub fn clean_expired(&self) -> usize {
        let keys = match self.store.keys_with_prefix(CACHE_PREFIX) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!("failed to scan cache keys: {}", e);
                return 0;
            }
        };

        let now = chrono::Utc::now().timestamp_millis();
        let mut removed = 0;

        for full_key in keys {
            let stale = match self.store.get_raw(&full_key) {
                Ok(Some(raw)) => match serde_json::from_str::<CacheEntry<serde_json::Value>>(&raw)
                {
                    Ok(entry) => entry.is_expired(now),
                    // Corrupt entries are deleted as well.
                    Err(_) => true,
                },
                _ => false,
            };

            if stale {
                if self.store.remove(&full_key).is_ok() {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, "cleaned expired cache entries");
        }
        removed
    }

    fn namespaced(key: &str) -> String {
        format!("{}{}", CACHE_PREFIX, key)
    }
}
