//! Cache storage backends.
//!
//! One abstract store, two implementations: a bounded in-process map and a
//! persisted directory of JSON files that survives restarts (a scheduled
//! burst of demand right after startup should still hit cache). Callers go
//! through `ResponseCache` and stay oblivious to which backend is active.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::modules::market_data::domain::DataCategory;
use crate::shared::errors::{AppError, AppResult};

/// One cached response: payload plus everything needed to judge freshness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    pub payload: serde_json::Value,
    pub category: DataCategory,
    pub stored_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl StoredEntry {
    pub fn new(payload: serde_json::Value, category: DataCategory, ttl: Duration) -> Self {
        Self {
            payload,
            category,
            stored_at: Utc::now(),
            ttl,
        }
    }

    /// Valid iff `now - stored_at < ttl`.
    pub fn is_expired(&self) -> bool {
        match Utc::now().signed_duration_since(self.stored_at).to_std() {
            Ok(age) => age >= self.ttl,
            // stored_at in the future means clock skew; keep the entry.
            Err(_) => false,
        }
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<StoredEntry>>;
    async fn set(&self, key: &str, entry: StoredEntry) -> AppResult<()>;
    async fn remove(&self, key: &str) -> AppResult<()>;
    /// Drop every expired entry, returning how many were removed.
    async fn purge_expired(&self) -> AppResult<usize>;
    async fn clear(&self) -> AppResult<()>;
    async fn len(&self) -> usize;
}

/// Bounded in-process store. When full, the oldest inserted key is evicted
/// first (simple FIFO bound, not strict LRU).
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
    insertion_order: Mutex<VecDeque<String>>,
    max_entries: usize,
}

impl MemoryStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            insertion_order: Mutex::new(VecDeque::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// The order ledger stays usable even if a holder panicked; a possibly
    /// stale eviction order is better than poisoning every later write.
    fn order(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.insertion_order
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> AppResult<Option<StoredEntry>> {
        Ok(self.entries.get(key).map(|e| e.clone()))
    }

    async fn set(&self, key: &str, entry: StoredEntry) -> AppResult<()> {
        let is_new = !self.entries.contains_key(key);
        if is_new && self.entries.len() >= self.max_entries {
            let oldest = self.order().pop_front();
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
                debug!(key = %oldest, "evicted oldest cache entry");
            }
        }

        self.entries.insert(key.to_string(), entry);
        if is_new {
            self.order().push_back(key.to_string());
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        self.entries.remove(key);
        self.order().retain(|k| k != key);
        Ok(())
    }

    async fn purge_expired(&self) -> AppResult<usize> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().is_expired())
            .map(|e| e.key().clone())
            .collect();
        for key in &expired {
            self.entries.remove(key);
        }
        self.order().retain(|k| self.entries.contains_key(k));
        Ok(expired.len())
    }

    async fn clear(&self) -> AppResult<()> {
        self.entries.clear();
        self.order().clear();
        Ok(())
    }

    async fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Persisted store: one JSON file per key under a cache directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Fails if the directory cannot be created; callers fall back to
    /// `MemoryStore` in that case.
    pub fn new(dir: impl AsRef<Path>) -> AppResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys contain separators and parameter strings; keep a readable
        // prefix and disambiguate with a hash of the full key.
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .take(80)
            .collect();
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        self.dir.join(format!("{}_{:016x}.json", safe, hasher.finish()))
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn get(&self, key: &str) -> AppResult<Option<StoredEntry>> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<StoredEntry>(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                // Malformed on disk: drop the file so it cannot poison
                // future reads, and report corruption to the caller.
                let _ = tokio::fs::remove_file(&path).await;
                Err(AppError::CacheCorruption(format!(
                    "unreadable cache file for key '{}': {}",
                    key, e
                )))
            }
        }
    }

    async fn set(&self, key: &str, entry: StoredEntry) -> AppResult<()> {
        let path = self.path_for(key);
        let raw = serde_json::to_vec(&entry)?;
        tokio::fs::write(&path, raw).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn purge_expired(&self) -> AppResult<usize> {
        let mut removed = 0;
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(file) = dir.next_entry().await? {
            let path = file.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let drop_file = match tokio::fs::read(&path).await {
                Ok(raw) => match serde_json::from_slice::<StoredEntry>(&raw) {
                    Ok(entry) => entry.is_expired(),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "dropping corrupt cache file");
                        true
                    }
                },
                Err(_) => continue,
            };
            if drop_file {
                if tokio::fs::remove_file(&path).await.is_ok() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn clear(&self) -> AppResult<()> {
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(file) = dir.next_entry().await? {
            let path = file.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                let _ = tokio::fs::remove_file(&path).await;
            }
        }
        Ok(())
    }

    async fn len(&self) -> usize {
        let mut count = 0;
        if let Ok(mut dir) = tokio::fs::read_dir(&self.dir).await {
            while let Ok(Some(file)) = dir.next_entry().await {
                if file.path().extension().and_then(|e| e.to_str()) == Some("json") {
                    count += 1;
                }
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_store_evicts_oldest_when_full() {
        let store = MemoryStore::new(2);
        let entry = |v| StoredEntry::new(json!(v), DataCategory::Price, Duration::from_secs(60));

        store.set("a", entry(1)).await.unwrap();
        store.set("b", entry(2)).await.unwrap();
        store.set("c", entry(3)).await.unwrap();

        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.get("b").await.unwrap().is_some());
        assert!(store.get("c").await.unwrap().is_some());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn overwriting_does_not_duplicate_order_slots() {
        let store = MemoryStore::new(2);
        let entry = |v| StoredEntry::new(json!(v), DataCategory::Price, Duration::from_secs(60));

        store.set("a", entry(1)).await.unwrap();
        store.set("a", entry(2)).await.unwrap();
        store.set("b", entry(3)).await.unwrap();
        store.set("c", entry(4)).await.unwrap();

        // "a" was the oldest insertion and goes first.
        assert!(store.get("a").await.unwrap().is_none());
        assert_eq!(store.get("c").await.unwrap().unwrap().payload, json!(4));
    }

    #[tokio::test]
    async fn a_poisoned_order_ledger_does_not_block_writes() {
        let store = MemoryStore::new(2);
        let entry = |v| StoredEntry::new(json!(v), DataCategory::Price, Duration::from_secs(60));
        store.set("a", entry(1)).await.unwrap();

        // Panic while holding the ledger lock, as a crashing task would.
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = store.insertion_order.lock().unwrap();
            panic!("holder crashed");
        }));
        assert!(store.insertion_order.is_poisoned());

        // Writes and eviction keep working on the recovered ledger.
        store.set("b", entry(2)).await.unwrap();
        store.set("c", entry(3)).await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert_eq!(store.len().await, 2);
    }

    #[test]
    fn zero_ttl_entry_is_born_expired() {
        let entry = StoredEntry::new(json!(1.0), DataCategory::Price, Duration::ZERO);
        assert!(entry.is_expired());
    }
}
