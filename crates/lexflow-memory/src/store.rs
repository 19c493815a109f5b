use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// A single value held in the store, namespaced by agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// The stored value. When `compressed`, this is the compact JSON text
    /// form of the original value, held as a JSON string.
    value: serde_json::Value,
    /// When the entry was written.
    pub stored_at: DateTime<Utc>,
    /// Time-to-live in seconds.
    pub ttl_secs: u64,
    /// Whether `value` is in packed form.
    pub compressed: bool,
}

impl MemoryEntry {
    /// An entry is expired once strictly more than `ttl_secs` have elapsed
    /// since it was stored. Expired entries read as absent whether or not
    /// the sweeper has removed them yet.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.stored_at > Duration::seconds(self.ttl_secs as i64)
    }

    fn unpack(&self) -> Option<serde_json::Value> {
        if self.compressed {
            let text = self.value.as_str()?;
            match serde_json::from_str(text) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding unreadable packed entry");
                    None
                }
            }
        } else {
            Some(self.value.clone())
        }
    }
}

/// Namespaced key/value cache with per-entry TTL.
///
/// Expiry is enforced on every read; the periodic sweep only reclaims
/// memory and is never the correctness mechanism. A miss is a plain
/// `None` — the store has no error-shaped outcomes.
pub struct MemoryStore {
    namespaces: RwLock<HashMap<String, HashMap<String, MemoryEntry>>>,
    default_ttl_secs: u64,
    pack_values: bool,
}

impl MemoryStore {
    /// Create a store with the given default TTL and packing mode.
    pub fn new(default_ttl_secs: u64, pack_values: bool) -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
            default_ttl_secs,
            pack_values,
        }
    }

    /// Write a value under `(agent, key)`, replacing any previous entry.
    /// `ttl_secs` falls back to the store default when `None`.
    pub async fn store(
        &self,
        agent: &str,
        key: impl Into<String>,
        value: serde_json::Value,
        ttl_secs: Option<u64>,
    ) {
        let (value, compressed) = if self.pack_values {
            match serde_json::to_string(&value) {
                Ok(text) => (serde_json::Value::String(text), true),
                Err(_) => (value, false),
            }
        } else {
            (value, false)
        };

        let entry = MemoryEntry {
            value,
            stored_at: Utc::now(),
            ttl_secs: ttl_secs.unwrap_or(self.default_ttl_secs),
            compressed,
        };

        let mut namespaces = self.namespaces.write().await;
        namespaces
            .entry(agent.to_string())
            .or_default()
            .insert(key.into(), entry);
    }

    /// Read the value under `(agent, key)`, unpacking if needed.
    /// Absent and expired entries both yield `None`.
    pub async fn retrieve(&self, agent: &str, key: &str) -> Option<serde_json::Value> {
        let namespaces = self.namespaces.read().await;
        let entry = namespaces.get(agent)?.get(key)?;
        if entry.is_expired(Utc::now()) {
            return None;
        }
        entry.unpack()
    }

    /// Remove the entry under `(agent, key)`. Returns whether one existed.
    pub async fn delete(&self, agent: &str, key: &str) -> bool {
        let mut namespaces = self.namespaces.write().await;
        namespaces
            .get_mut(agent)
            .is_some_and(|ns| ns.remove(key).is_some())
    }

    /// Physically remove all expired entries. Returns the eviction count.
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut namespaces = self.namespaces.write().await;
        let mut evicted = 0;
        for entries in namespaces.values_mut() {
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now));
            evicted += before - entries.len();
        }
        namespaces.retain(|_, entries| !entries.is_empty());
        if evicted > 0 {
            tracing::info!(evicted, "Memory sweep reclaimed expired entries");
        }
        evicted
    }

    /// Spawn the background sweep loop.
    ///
    /// Returns the [`JoinHandle`] so the caller can abort it on shutdown.
    pub fn spawn_sweeper(store: Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                store.sweep().await;
            }
        })
    }

    /// Physical entry count across all namespaces (may include entries that
    /// are logically expired but not yet swept).
    pub async fn entry_count(&self) -> usize {
        let namespaces = self.namespaces.read().await;
        namespaces.values().map(HashMap::len).sum()
    }

    /// Keys currently stored under an agent's namespace.
    pub async fn keys(&self, agent: &str) -> Vec<String> {
        let namespaces = self.namespaces.read().await;
        namespaces
            .get(agent)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let store = MemoryStore::new(3600, false);
        store
            .store("intake", "case-42", serde_json::json!({"score": 7}), None)
            .await;
        let value = store.retrieve("intake", "case-42").await.unwrap();
        assert_eq!(value["score"], 7);
    }

    #[tokio::test]
    async fn test_miss_is_none() {
        let store = MemoryStore::new(3600, false);
        assert!(store.retrieve("intake", "missing").await.is_none());
        assert!(store.retrieve("nobody", "anything").await.is_none());
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = MemoryStore::new(3600, false);
        store
            .store("intake", "shared-key", serde_json::json!(1), None)
            .await;
        store
            .store("research", "shared-key", serde_json::json!(2), None)
            .await;
        assert_eq!(store.retrieve("intake", "shared-key").await.unwrap(), 1);
        assert_eq!(store.retrieve("research", "shared-key").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_absent_without_sweep() {
        let store = MemoryStore::new(3600, false);
        store
            .store("intake", "ephemeral", serde_json::json!("x"), Some(1))
            .await;
        assert!(store.retrieve("intake", "ephemeral").await.is_some());

        tokio::time::sleep(std::time::Duration::from_millis(1200)).await;

        // No sweep has run; the read-side check alone must miss.
        assert!(store.retrieve("intake", "ephemeral").await.is_none());
        assert_eq!(store.entry_count().await, 1);
    }

    #[tokio::test]
    async fn test_sweep_evicts_expired_only() {
        let store = MemoryStore::new(3600, false);
        store
            .store("intake", "stale", serde_json::json!("old"), Some(0))
            .await;
        store
            .store("intake", "fresh", serde_json::json!("new"), Some(600))
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let evicted = store.sweep().await;
        assert_eq!(evicted, 1);
        assert_eq!(store.entry_count().await, 1);
        assert!(store.retrieve("intake", "fresh").await.is_some());
    }

    #[tokio::test]
    async fn test_sweeper_loop_runs() {
        let store = Arc::new(MemoryStore::new(3600, false));
        store
            .store("intake", "stale", serde_json::json!("old"), Some(0))
            .await;

        let handle =
            MemoryStore::spawn_sweeper(store.clone(), std::time::Duration::from_millis(30));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(store.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new(3600, false);
        store
            .store("intake", "doomed", serde_json::json!(true), None)
            .await;
        assert!(store.delete("intake", "doomed").await);
        assert!(!store.delete("intake", "doomed").await);
        assert!(store.retrieve("intake", "doomed").await.is_none());
    }

    #[tokio::test]
    async fn test_packed_values_round_trip() {
        let store = MemoryStore::new(3600, true);
        let value = serde_json::json!({"client": "acme", "matters": [1, 2, 3]});
        store.store("intake", "case", value.clone(), None).await;
        assert_eq!(store.retrieve("intake", "case").await.unwrap(), value);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_entry() {
        let store = MemoryStore::new(3600, false);
        store.store("a", "k", serde_json::json!(1), None).await;
        store.store("a", "k", serde_json::json!(2), None).await;
        assert_eq!(store.retrieve("a", "k").await.unwrap(), 2);
        assert_eq!(store.entry_count().await, 1);
    }

    #[test]
    fn test_is_expired_boundary() {
        let entry = MemoryEntry {
            value: serde_json::Value::Null,
            stored_at: Utc::now() - Duration::seconds(2),
            ttl_secs: 1,
            compressed: false,
        };
        assert!(entry.is_expired(Utc::now()));

        let fresh = MemoryEntry {
            value: serde_json::Value::Null,
            stored_at: Utc::now(),
            ttl_secs: 60,
            compressed: false,
        };
        assert!(!fresh.is_expired(Utc::now()));
    }

    #[tokio::test]
    async fn test_keys_listing() {
        let store = MemoryStore::new(3600, false);
        store.store("intake", "a", serde_json::json!(1), None).await;
        store.store("intake", "b", serde_json::json!(2), None).await;
        let mut keys = store.keys("intake").await;
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
        assert!(store.keys("nobody").await.is_empty());
    }
}
