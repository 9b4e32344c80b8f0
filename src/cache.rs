use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::store::{DocumentStore, empty_object};

/// Maximum age of a clean cached document before a `get` refetches it.
const CACHE_TTL: Duration = Duration::from_secs(5 * 60);
/// Interval between periodic flushes of dirty documents.
const COMMIT_INTERVAL: Duration = Duration::from_secs(10 * 60);
/// Delay before the first flush, so anything staged during startup
/// (e.g. newly created level roles) is persisted promptly.
const STARTUP_FLUSH_DELAY: Duration = Duration::from_secs(5);
/// Gap between consecutive document writes in one flush, to stay well
/// under the hosting API's rate limits.
const WRITE_SPACING: Duration = Duration::from_secs(1);

struct CacheEntry {
    value: Value,
    fetched_at: Instant,
    dirty: bool,
}

/// Cache-aside layer over a [`DocumentStore`]. Reads are served from
/// memory within the TTL; writes only mark the entry dirty, and the
/// flusher commits dirty documents in batches.
pub struct DocCache {
    store: Arc<dyn DocumentStore>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl DocCache {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached document, refetching from the store when the
    /// entry is missing or older than the TTL. A dirty entry is always
    /// served as-is, whatever its age: a TTL refetch must never clobber
    /// local mutations that have not been flushed yet.
    ///
    /// The map lock is held across the remote read so concurrent
    /// lookups of an expired document do not race into duplicate
    /// fetches; at this scale that trade is fine.
    pub async fn get(&self, name: &str) -> Value {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get(name) {
            if entry.dirty || entry.fetched_at.elapsed() < CACHE_TTL {
                return entry.value.clone();
            }
        }

        match self.store.read(name).await {
            Ok(value) => {
                debug!(doc = name, "refreshed document from store");
                entries.insert(
                    name.to_string(),
                    CacheEntry {
                        value: value.clone(),
                        fetched_at: Instant::now(),
                        dirty: false,
                    },
                );
                value
            }
            Err(err) => {
                // Fall back to "no data yet" without caching it, so the
                // next get retries the store.
                warn!(doc = name, error = %err, "document read failed, serving empty");
                empty_object()
            }
        }
    }

    /// Replaces the cached document and marks it dirty. No remote
    /// traffic happens here; the flusher picks the document up later.
    pub async fn put(&self, name: &str, value: Value) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            name.to_string(),
            CacheEntry {
                value,
                fetched_at: Instant::now(),
                dirty: true,
            },
        );
    }

    /// Typed read: absent or malformed data becomes the default shape
    /// instead of an error, matching the "no data yet" read contract.
    pub async fn get_as<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        match serde_json::from_value(self.get(name).await) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(doc = name, error = %err, "document failed validation, using default");
                T::default()
            }
        }
    }

    /// Typed write-through to [`DocCache::put`].
    pub async fn put_as<T: Serialize>(&self, name: &str, doc: &T) -> Result<(), serde_json::Error> {
        self.put(name, serde_json::to_value(doc)?).await;
        Ok(())
    }

    /// Commits every dirty document to the store, one at a time with a
    /// fixed gap between writes. A failed write leaves the entry dirty
    /// so the next flush retries it; there is no backoff beyond the
    /// flush cadence itself. The dirty flag is only cleared when the
    /// cached value is still the one that was written, so a `put` that
    /// lands mid-flush is not lost.
    pub async fn flush_all(&self) {
        let dirty: Vec<(String, Value)> = {
            let entries = self.entries.lock().await;
            entries
                .iter()
                .filter(|(_, entry)| entry.dirty)
                .map(|(name, entry)| (name.clone(), entry.value.clone()))
                .collect()
        };
        if dirty.is_empty() {
            return;
        }
        info!(count = dirty.len(), "flushing dirty documents");

        for (index, (name, value)) in dirty.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(WRITE_SPACING).await;
            }
            match self.store.write(name, value).await {
                Ok(()) => {
                    let mut entries = self.entries.lock().await;
                    if let Some(entry) = entries.get_mut(name) {
                        if entry.value == *value {
                            entry.dirty = false;
                            entry.fetched_at = Instant::now();
                        }
                    }
                }
                Err(err) => {
                    warn!(doc = name, error = %err, "flush failed, will retry next cycle");
                }
            }
        }
    }
}

/// Background flush loop: once shortly after startup, then on a fixed
/// interval. The final shutdown flush is driven from `main`, not here.
pub fn spawn_flusher(cache: Arc<DocCache>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(STARTUP_FLUSH_DELAY).await;
        cache.flush_all().await;
        let mut ticker = tokio::time::interval(COMMIT_INTERVAL);
        ticker.tick().await; // first tick completes immediately
        loop {
            ticker.tick().await;
            cache.flush_all().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::RecordingStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn cache_over(store: Arc<RecordingStore>) -> DocCache {
        DocCache::new(store)
    }

    #[tokio::test(start_paused = true)]
    async fn second_get_within_ttl_hits_cache() {
        let store = Arc::new(RecordingStore::with_doc("users.json", json!({"1": 1})));
        let cache = cache_over(store.clone());

        assert_eq!(cache.get("users.json").await, json!({"1": 1}));
        assert_eq!(cache.get("users.json").await, json!({"1": 1}));
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_clean_entry_is_refetched() {
        let store = Arc::new(RecordingStore::with_doc("users.json", json!({"a": 1})));
        let cache = cache_over(store.clone());

        cache.get("users.json").await;
        store
            .write("users.json", &json!({"a": 2}))
            .await
            .unwrap();
        tokio::time::advance(CACHE_TTL + Duration::from_secs(1)).await;

        assert_eq!(cache.get("users.json").await, json!({"a": 2}));
    }

    #[tokio::test(start_paused = true)]
    async fn dirty_entry_survives_ttl_expiry() {
        let store = Arc::new(RecordingStore::with_doc("users.json", json!({"stale": true})));
        let cache = cache_over(store.clone());

        cache.put("users.json", json!({"local": true})).await;
        tokio::time::advance(CACHE_TTL + Duration::from_secs(1)).await;

        assert_eq!(cache.get("users.json").await, json!({"local": true}));
        assert_eq!(store.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_commits_once_and_clears_dirty() {
        let store = Arc::new(RecordingStore::default());
        let cache = cache_over(store.clone());

        cache.put("users.json", json!({"42": 7})).await;
        cache.flush_all().await;
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert_eq!(store.document("users.json"), Some(json!({"42": 7})));

        // Nothing dirty left, so another flush stays quiet.
        cache.flush_all().await;
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);

        // And a get within TTL stays local.
        cache.get("users.json").await;
        assert_eq!(store.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_flush_keeps_entry_dirty_for_retry() {
        let store = Arc::new(RecordingStore::default());
        let cache = cache_over(store.clone());

        cache.put("users.json", json!({"42": 7})).await;
        store.fail_writes.store(true, Ordering::SeqCst);
        cache.flush_all().await;
        assert_eq!(store.document("users.json"), None);

        store.fail_writes.store(false, Ordering::SeqCst);
        cache.flush_all().await;
        assert_eq!(store.document("users.json"), Some(json!({"42": 7})));
    }

    #[tokio::test(start_paused = true)]
    async fn flush_writes_documents_sequentially() {
        let store = Arc::new(RecordingStore::default());
        let cache = cache_over(store.clone());

        cache.put("users.json", json!({"u": 1})).await;
        cache.put("roles.json", json!({"r": 1})).await;
        cache.flush_all().await;

        assert_eq!(store.writes.load(Ordering::SeqCst), 2);
        assert_eq!(store.document("users.json"), Some(json!({"u": 1})));
        assert_eq!(store.document("roles.json"), Some(json!({"r": 1})));
    }

    #[tokio::test(start_paused = true)]
    async fn read_failure_serves_empty_without_caching() {
        let store = Arc::new(RecordingStore::with_doc("users.json", json!({"a": 1})));
        let cache = cache_over(store.clone());

        store.fail_reads.store(true, Ordering::SeqCst);
        assert_eq!(cache.get("users.json").await, json!({}));

        // The fallback was not cached, so recovery is immediate.
        store.fail_reads.store(false, Ordering::SeqCst);
        assert_eq!(cache.get("users.json").await, json!({"a": 1}));
        assert_eq!(store.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn typed_read_defaults_malformed_documents() {
        use crate::types::UsersDoc;

        let store = Arc::new(RecordingStore::with_doc("users.json", json!([1, 2, 3])));
        let cache = cache_over(store);
        let users: UsersDoc = cache.get_as("users.json").await;
        assert!(users.is_empty());
    }
}
