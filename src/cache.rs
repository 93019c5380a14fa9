use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::debounce::Debouncer;
use crate::store::KeyValueStore;

pub const SAVE_DELAY: Duration = Duration::from_secs(5);

/// Source of "now" in milliseconds since the epoch
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Key under which the table is persisted
    pub storage_key: String,
    pub expiry: Duration,
    pub max_entries: usize,
    pub save_delay: Duration,
}

impl CacheSettings {
    /// Scraped transcripts and metadata: 30 minutes, 100 entries
    pub fn video_data() -> Self {
        Self {
            storage_key: "video-cache".to_string(),
            expiry: Duration::from_secs(30 * 60),
            max_entries: 100,
            save_delay: SAVE_DELAY,
        }
    }

    /// Generated summaries: 24 hours, 50 entries
    pub fn summaries() -> Self {
        Self {
            storage_key: "summary-cache".to_string(),
            expiry: Duration::from_secs(24 * 60 * 60),
            max_entries: 50,
            save_delay: SAVE_DELAY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: u64,
}

struct CacheInner<T> {
    settings: CacheSettings,
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn KeyValueStore>,
}

impl<T> CacheInner<T>
where
    T: Serialize,
{
    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<T>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn expiry_ms(&self) -> u64 {
        self.settings.expiry.as_millis() as u64
    }

    fn is_expired(&self, entry: &CacheEntry<T>, now: u64) -> bool {
        now.saturating_sub(entry.timestamp) > self.expiry_ms()
    }

    fn cleanup(&self, entries: &mut HashMap<String, CacheEntry<T>>) -> usize {
        let now = self.clock.now_ms();
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        let expired = before - entries.len();

        let mut trimmed = 0;
        if entries.len() > self.settings.max_entries {
            let mut by_age: Vec<(String, u64)> = entries.iter().map(|(k, e)| (k.clone(), e.timestamp)).collect();
            by_age.sort_by_key(|(_, timestamp)| *timestamp);
            let excess = entries.len() - self.settings.max_entries;
            for (key, _) in by_age.into_iter().take(excess) {
                entries.remove(&key);
                trimmed += 1;
            }
        }

        if expired + trimmed > 0 {
            debug!(
                "{}: removed {expired} expired and {trimmed} oldest entries",
                self.settings.storage_key
            );
        }
        expired + trimmed
    }

    fn save(&self) {
        let snapshot = {
            let entries = self.entries();
            serde_json::to_string(&*entries)
        };
        let result = snapshot
            .map_err(eyre::Report::from)
            .and_then(|json| self.store.set(&self.settings.storage_key, &json));
        match result {
            Ok(()) => debug!("{}: saved", self.settings.storage_key),
            Err(e) => warn!("{}: failed to save cache: {e}", self.settings.storage_key),
        }
    }
}

/// In-memory table mirrored to a `KeyValueStore`, bounded by age and size.
///
/// The video data and summary tables are both instances of this; they differ
/// only in `CacheSettings`.
pub struct ExpiringCache<T> {
    inner: Arc<CacheInner<T>>,
    saver: Debouncer,
}

impl<T> ExpiringCache<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Build the table from whatever the store holds, dropping expired entries.
    /// Unreadable persisted data starts an empty table.
    pub fn load(settings: CacheSettings, clock: Arc<dyn Clock>, store: Arc<dyn KeyValueStore>) -> Self {
        let persisted = match store.get(&settings.storage_key) {
            Ok(Some(json)) => serde_json::from_str::<HashMap<String, CacheEntry<T>>>(&json).unwrap_or_else(|e| {
                warn!("{}: discarding unreadable cache: {e}", settings.storage_key);
                HashMap::new()
            }),
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!("{}: failed to read cache: {e}", settings.storage_key);
                HashMap::new()
            }
        };

        let saver = Debouncer::new(settings.save_delay);
        let inner = Arc::new(CacheInner {
            settings,
            entries: Mutex::new(HashMap::new()),
            clock,
            store,
        });

        {
            let mut entries = inner.entries();
            *entries = persisted;
            let loaded = entries.len();
            inner.cleanup(&mut entries);
            debug!(
                "{}: restored {} of {loaded} persisted entries",
                inner.settings.storage_key,
                entries.len()
            );
        }

        Self { inner, saver }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        let mut entries = self.inner.entries();
        self.inner.cleanup(&mut entries);
        match entries.get(key) {
            Some(entry) => {
                debug!("Cache hit: {key}");
                Some(entry.data.clone())
            }
            None => {
                debug!("Cache miss: {key}");
                None
            }
        }
    }

    /// Replace the entry for `key` and schedule a save
    pub fn set(&self, key: impl Into<String>, value: T) {
        let key = key.into();
        let timestamp = self.inner.clock.now_ms();
        self.inner.entries().insert(key.clone(), CacheEntry { data: value, timestamp });
        debug!("Cached {key}");

        let inner = self.inner.clone();
        self.saver.schedule(move || inner.save());
    }

    /// Remove expired entries, then the oldest ones beyond the size bound
    pub fn cleanup(&self) -> usize {
        let mut entries = self.inner.entries();
        self.inner.cleanup(&mut entries)
    }

    /// Drop every entry, in memory and in the store
    pub fn purge_all(&self) {
        self.saver.cancel();
        self.inner.entries().clear();
        if let Err(e) = self.inner.store.remove(&self.inner.settings.storage_key) {
            warn!("{}: failed to remove persisted cache: {e}", self.inner.settings.storage_key);
        }
    }

    /// Save now instead of waiting for the debounce
    pub fn flush(&self) {
        self.saver.cancel();
        self.inner.save();
    }

    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `cleanup` every half expiry window until the handle is aborted
    pub fn spawn_cleanup_timer(&self) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let period = (inner.settings.expiry / 2).max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let mut entries = inner.entries();
                inner.cleanup(&mut entries);
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicU64, Ordering};

    pub(crate) struct ManualClock(AtomicU64);

    impl ManualClock {
        pub(crate) fn new(now: u64) -> Arc<Self> {
            Arc::new(Self(AtomicU64::new(now)))
        }

        pub(crate) fn set(&self, now: u64) {
            self.0.store(now, Ordering::SeqCst);
        }

        pub(crate) fn advance(&self, by: Duration) {
            self.0.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn settings(max_entries: usize) -> CacheSettings {
        CacheSettings {
            storage_key: "test-cache".to_string(),
            expiry: Duration::from_secs(60),
            max_entries,
            save_delay: SAVE_DELAY,
        }
    }

    #[test]
    fn test_set_and_get() {
        let cache: ExpiringCache<String> =
            ExpiringCache::load(settings(10), ManualClock::new(1_000), Arc::new(MemoryStore::new()));
        assert_eq!(cache.get("a"), None);
        cache.set("a", "first".to_string());
        cache.set("a", "second".to_string());
        assert_eq!(cache.get("a").as_deref(), Some("second"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expiry_boundary() {
        let clock = ManualClock::new(10_000);
        let cache: ExpiringCache<String> =
            ExpiringCache::load(settings(10), clock.clone(), Arc::new(MemoryStore::new()));
        cache.set("k", "v".to_string());

        clock.advance(Duration::from_millis(59_999));
        assert_eq!(cache.get("k").as_deref(), Some("v"));

        clock.advance(Duration::from_millis(2));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_eviction_by_timestamp_not_insertion_order() {
        let clock = ManualClock::new(0);
        let cache: ExpiringCache<u32> = ExpiringCache::load(settings(3), clock.clone(), Arc::new(MemoryStore::new()));

        for (key, at) in [("a", 500), ("b", 100), ("c", 300), ("d", 200), ("e", 400)] {
            clock.set(at);
            cache.set(key, at as u32);
        }
        clock.set(600);

        assert_eq!(cache.len(), 5);
        assert_eq!(cache.cleanup(), 2);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("d"), None);
        assert_eq!(cache.get("a"), Some(500));
        assert_eq!(cache.get("c"), Some(300));
        assert_eq!(cache.get("e"), Some(400));
    }

    #[test]
    fn test_get_runs_cleanup() {
        let clock = ManualClock::new(0);
        let cache: ExpiringCache<u32> = ExpiringCache::load(settings(2), clock.clone(), Arc::new(MemoryStore::new()));
        for (i, key) in ["x", "y", "z"].iter().enumerate() {
            clock.set(i as u64);
            cache.set(*key, i as u32);
        }
        assert_eq!(cache.get("x"), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_reload_drops_expired() {
        let clock = ManualClock::new(0);
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        // no runtime here, so each set saves immediately
        let cache: ExpiringCache<String> = ExpiringCache::load(settings(10), clock.clone(), store.clone());
        cache.set("old", "stale".to_string());
        clock.set(50_000);
        cache.set("new", "fresh".to_string());

        clock.set(70_000);
        let reloaded: ExpiringCache<String> = ExpiringCache::load(settings(10), clock.clone(), store);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("new").as_deref(), Some("fresh"));
        assert_eq!(reloaded.get("old"), None);
    }

    #[test]
    fn test_unreadable_store_starts_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set("test-cache", "not json").unwrap();
        let cache: ExpiringCache<String> = ExpiringCache::load(settings(10), ManualClock::new(0), store);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_is_debounced() {
        let clock = ManualClock::new(0);
        let store = Arc::new(MemoryStore::new());
        let cache: ExpiringCache<String> = ExpiringCache::load(settings(10), clock, store.clone());

        cache.set("a", "1".to_string());
        tokio::time::sleep(Duration::from_secs(3)).await;
        cache.set("b", "2".to_string());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(store.get("test-cache").unwrap(), None);

        tokio::time::sleep(Duration::from_secs(3)).await;
        let saved = store.get("test-cache").unwrap().unwrap();
        let entries: HashMap<String, CacheEntry<String>> = serde_json::from_str(&saved).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["b"].data, "2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_saves_immediately() {
        let store = Arc::new(MemoryStore::new());
        let cache: ExpiringCache<String> = ExpiringCache::load(settings(10), ManualClock::new(0), store.clone());
        cache.set("a", "1".to_string());
        cache.flush();
        assert!(store.get("test-cache").unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_all() {
        let store = Arc::new(MemoryStore::new());
        let cache: ExpiringCache<String> = ExpiringCache::load(settings(10), ManualClock::new(0), store.clone());
        cache.set("a", "1".to_string());
        cache.flush();
        cache.set("b", "2".to_string());

        cache.purge_all();
        assert!(cache.is_empty());
        assert_eq!(store.get("test-cache").unwrap(), None);

        // the pending save was canceled
        tokio::time::sleep(SAVE_DELAY * 2).await;
        assert_eq!(store.get("test-cache").unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_timer() {
        let clock = ManualClock::new(0);
        let cache: ExpiringCache<String> =
            ExpiringCache::load(settings(10), clock.clone(), Arc::new(MemoryStore::new()));
        cache.set("a", "1".to_string());
        let timer = cache.spawn_cleanup_timer();

        clock.set(61_000);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(cache.is_empty());
        timer.abort();
    }
}
