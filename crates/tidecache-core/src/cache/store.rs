use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::entry::CacheEntry;
use super::pattern::KeyPattern;
use super::persistent::{MemoryStore, PersistentStore};
use crate::clock::{SharedClock, SystemClock};
use crate::config::CacheConfig;

/// Prefix marking this cache's keys inside a shared persistent backend
const PERSISTENT_NAMESPACE: &str = "cache_";

struct Slot {
    entry: CacheEntry,
    /// Monotonic access stamp; the smallest is least recently touched
    last_access: u64,
}

#[derive(Default)]
struct MemoryTier {
    slots: HashMap<String, Slot>,
    access_counter: u64,
}

impl MemoryTier {
    fn next_stamp(&mut self) -> u64 {
        self.access_counter += 1;
        self.access_counter
    }

    fn insert(&mut self, entry: CacheEntry, capacity: usize) {
        let last_access = self.next_stamp();
        self.slots.insert(entry.key.clone(), Slot { entry, last_access });
        self.evict_to(capacity);
    }

    fn evict_to(&mut self, capacity: usize) {
        if self.slots.len() <= capacity {
            return;
        }
        let mut by_age: Vec<(u64, String)> = self
            .slots
            .iter()
            .map(|(key, slot)| (slot.last_access, key.clone()))
            .collect();
        by_age.sort_unstable();

        let excess = self.slots.len() - capacity;
        for (_, key) in by_age.into_iter().take(excess) {
            debug!(key = %key, "Evicting least recently used entry");
            self.slots.remove(&key);
        }
    }
}

/// What the store knows about one persisted entry without reading it back.
#[derive(Debug, Clone, Copy)]
struct PersistedMeta {
    bytes: usize,
    expires_at: DateTime<Utc>,
}

/// Live (unexpired) contents of each tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CacheStats {
    pub memory_entries: usize,
    pub persistent_entries: usize,
    pub persistent_bytes: usize,
    pub memory_keys: Vec<String>,
    pub persistent_keys: Vec<String>,
}

/// Two-tier cache: a bounded in-process map in front of a size-bounded
/// persistent store. Values are opaque JSON; callers decode them.
pub struct CacheStore {
    memory: Mutex<MemoryTier>,
    persistent: Arc<dyn PersistentStore>,
    /// Size and expiry of this store's persisted entries, scanned from the
    /// backend on first use and kept current by every write and removal
    persisted: Mutex<Option<HashMap<String, PersistedMeta>>>,
    config: CacheConfig,
    clock: SharedClock,
}

impl CacheStore {
    pub fn new(persistent: Arc<dyn PersistentStore>, config: CacheConfig) -> Self {
        Self {
            memory: Mutex::default(),
            persistent,
            persisted: Mutex::default(),
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Cache with a process-local persistent tier.
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn memory(&self) -> MutexGuard<'_, MemoryTier> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `None` is the miss signal that tells the caller to go to the network.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entry(key).map(|entry| entry.payload)
    }

    /// Full entry lookup with the same tiering and promotion rules as [`get`](Self::get).
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        let now = self.now();
        {
            let mut memory = self.memory();
            let stamp = memory.next_stamp();
            match memory.slots.get_mut(key) {
                Some(slot) if !slot.entry.is_expired(now) => {
                    slot.last_access = stamp;
                    return Some(slot.entry.clone());
                }
                Some(_) => {
                    debug!(key, "Memory entry expired");
                    memory.slots.remove(key);
                }
                None => {}
            }
        }

        let entry = self.read_persistent(key, now)?;
        debug!(key, "Promoting persistent entry to memory");
        self.memory()
            .insert(entry.clone(), self.config.max_memory_entries);
        Some(entry)
    }

    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        let entry = CacheEntry::new(key, value, ttl, self.now());
        self.store(entry);
    }

    /// Apply `transform` to the cached value in place, keeping its expiry and
    /// bumping its version. Returns the untouched snapshot, or `None` when the
    /// key is not cached.
    pub fn update<F>(&self, key: &str, transform: F) -> Option<CacheEntry>
    where
        F: FnOnce(&Value) -> Value,
    {
        let snapshot = self.entry(key)?;
        let mut updated = snapshot.clone();
        updated.payload = transform(&snapshot.payload);
        updated.version = snapshot.version.saturating_add(1);
        self.store(updated);
        Some(snapshot)
    }

    /// Write a previously taken snapshot back verbatim.
    pub fn restore(&self, snapshot: CacheEntry) {
        self.store(snapshot);
    }

    fn store(&self, entry: CacheEntry) {
        self.persist(&entry);
        self.memory().insert(entry, self.config.max_memory_entries);
    }

    pub fn invalidate(&self, pattern: &str) {
        let pattern = KeyPattern::parse(pattern);
        let removed_memory = {
            let mut memory = self.memory();
            let before = memory.slots.len();
            memory.slots.retain(|key, _| !pattern.matches(key));
            before - memory.slots.len()
        };

        let mut removed_persistent = 0;
        match &pattern {
            KeyPattern::Exact(key) => self.remove_persistent(key),
            KeyPattern::Wildcard(_) => {
                let matching: Vec<String> = self.with_persisted(|persisted| {
                    persisted
                        .keys()
                        .filter(|key| pattern.matches(key))
                        .cloned()
                        .collect()
                });
                for key in matching {
                    self.remove_persistent(&key);
                    removed_persistent += 1;
                }
            }
        }
        debug!(?pattern, removed_memory, removed_persistent, "Invalidated cache entries");
    }

    pub fn clear(&self) {
        self.memory().slots.clear();
        for key in self.persistent_keys() {
            self.remove_persistent(&key);
        }
        self.with_persisted(|persisted| persisted.clear());
        debug!("Cache cleared");
    }

    /// Drop expired entries from both tiers, returning how many went.
    pub fn purge_expired(&self) -> usize {
        let now = self.now();
        let removed_memory = {
            let mut memory = self.memory();
            let before = memory.slots.len();
            memory.slots.retain(|_, slot| !slot.entry.is_expired(now));
            before - memory.slots.len()
        };
        removed_memory + self.purge_expired_persistent(now)
    }

    /// Expired entries still awaiting a purge are left out.
    pub fn stats(&self) -> CacheStats {
        let now = self.now();
        let mut memory_keys: Vec<String> = self
            .memory()
            .slots
            .iter()
            .filter(|(_, slot)| !slot.entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        memory_keys.sort();

        let (mut persistent_keys, persistent_bytes) = self.with_persisted(|persisted| {
            let live: Vec<(&String, &PersistedMeta)> = persisted
                .iter()
                .filter(|(_, meta)| now < meta.expires_at)
                .collect();
            let bytes = live.iter().map(|(_, meta)| meta.bytes).sum::<usize>();
            (live.into_iter().map(|(key, _)| key.clone()).collect::<Vec<_>>(), bytes)
        });
        persistent_keys.sort();

        CacheStats {
            memory_entries: memory_keys.len(),
            persistent_entries: persistent_keys.len(),
            persistent_bytes,
            memory_keys,
            persistent_keys,
        }
    }

    // ===== Persistent tier =====

    fn read_persistent(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let raw = match self.persistent.get(&namespaced(key)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read persistent cache entry");
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) if !entry.is_expired(now) => Some(entry),
            Ok(_) => {
                debug!(key, "Persistent entry expired");
                self.remove_persistent(key);
                None
            }
            Err(e) => {
                warn!(key, error = %e, "Discarding corrupt persistent cache entry");
                self.remove_persistent(key);
                None
            }
        }
    }

    fn persist(&self, entry: &CacheEntry) {
        let key = entry.key.as_str();
        match entry.payload_size() {
            Some(size) if size < self.config.small_payload_threshold => {}
            size => {
                debug!(key, ?size, "Payload too large for persistent tier, memory only");
                // An older small copy would otherwise resurface after eviction
                self.remove_persistent(key);
                return;
            }
        }

        let raw = match serde_json::to_string(entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };

        if !self.fits_budget(key, raw.len()) {
            self.purge_expired_persistent(self.now());
            if !self.fits_budget(key, raw.len()) {
                warn!(key, bytes = raw.len(), "Persistent tier over budget, skipping persist");
                self.remove_persistent(key);
                return;
            }
        }

        match self.persistent.set(&namespaced(key), &raw) {
            Ok(()) => {
                let meta = PersistedMeta {
                    bytes: raw.len(),
                    expires_at: entry.expires_at,
                };
                self.with_persisted(|persisted| persisted.insert(key.to_string(), meta));
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to persist cache entry");
                self.remove_persistent(key);
            }
        }
    }

    fn fits_budget(&self, key: &str, incoming: usize) -> bool {
        let used: usize = self.with_persisted(|persisted| {
            persisted
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, meta)| meta.bytes)
                .sum()
        });
        used + incoming <= self.config.max_persistent_bytes
    }

    fn purge_expired_persistent(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self.with_persisted(|persisted| {
            persisted
                .iter()
                .filter(|(_, meta)| meta.expires_at <= now)
                .map(|(key, _)| key.clone())
                .collect()
        });
        for key in &expired {
            self.remove_persistent(key);
        }
        if !expired.is_empty() {
            debug!(removed = expired.len(), "Purged expired persistent entries");
        }
        expired.len()
    }

    /// Run `f` over the persisted-entry index, scanning the backend the first
    /// time. Must not be re-entered from `f`.
    fn with_persisted<R>(&self, f: impl FnOnce(&mut HashMap<String, PersistedMeta>) -> R) -> R {
        let mut guard = self.persisted.lock().unwrap_or_else(PoisonError::into_inner);
        let persisted = guard.get_or_insert_with(|| self.scan_persistent());
        f(persisted)
    }

    fn scan_persistent(&self) -> HashMap<String, PersistedMeta> {
        let mut persisted = HashMap::new();
        for key in self.persistent_keys() {
            let raw = match self.persistent.get(&namespaced(&key)) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to read persistent cache entry");
                    continue;
                }
            };
            // Unreadable entries count as expired so the next purge drops them
            let expires_at = serde_json::from_str::<CacheEntry>(&raw)
                .map(|entry| entry.expires_at)
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            persisted.insert(
                key,
                PersistedMeta {
                    bytes: raw.len(),
                    expires_at,
                },
            );
        }
        debug!(entries = persisted.len(), "Indexed persistent tier");
        persisted
    }

    /// Cache keys (without namespace) currently in the persistent tier.
    fn persistent_keys(&self) -> Vec<String> {
        match self.persistent.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|k| k.strip_prefix(PERSISTENT_NAMESPACE).map(str::to_string))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to enumerate persistent cache keys");
                Vec::new()
            }
        }
    }

    fn remove_persistent(&self, key: &str) {
        if let Err(e) = self.persistent.remove(&namespaced(key)) {
            warn!(key, error = %e, "Failed to remove persistent cache entry");
        }
        if let Some(persisted) = self
            .persisted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            persisted.remove(key);
        }
    }
}

fn namespaced(key: &str) -> String {
    format!("{}{}", PERSISTENT_NAMESPACE, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::persistent::FileStore;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn store_with(config: CacheConfig) -> (CacheStore, ManualClock, Arc<MemoryStore>) {
        let clock = ManualClock::default();
        let backend = Arc::new(MemoryStore::new());
        let store = CacheStore::new(backend.clone(), config).with_clock(Arc::new(clock.clone()));
        (store, clock, backend)
    }

    fn store() -> (CacheStore, ManualClock, Arc<MemoryStore>) {
        store_with(CacheConfig::default())
    }

    #[test]
    fn test_set_then_get() {
        let (cache, _, _) = store();
        cache.set("k", json!({"a": [1, 2]}), Duration::minutes(1));
        assert_eq!(cache.get("k"), Some(json!({"a": [1, 2]})));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_expired_entry_is_gone_from_both_tiers() {
        let (cache, clock, _) = store();
        cache.set("k", json!(1), Duration::seconds(10));
        assert_eq!(cache.stats().persistent_entries, 1);

        clock.advance(Duration::seconds(11));
        assert_eq!(cache.get("k"), None);

        let stats = cache.stats();
        assert_eq!(stats.memory_entries, 0);
        assert_eq!(stats.persistent_entries, 0);
    }

    #[test]
    fn test_persistent_entry_promoted_on_read() {
        let (cache, _, backend) = store();
        cache.set("k", json!("v"), Duration::minutes(5));

        // A fresh session sharing the same backend starts with an empty memory tier
        let next = CacheStore::new(backend, CacheConfig::default());
        assert_eq!(next.stats().memory_entries, 0);
        assert_eq!(next.get("k"), Some(json!("v")));
        assert_eq!(next.stats().memory_keys, vec!["k".to_string()]);
    }

    #[test]
    fn test_lru_eviction_keeps_recently_touched() {
        let (cache, _, _) = store_with(CacheConfig {
            max_memory_entries: 3,
            ..Default::default()
        });
        cache.set("a", json!(1), Duration::minutes(5));
        cache.set("b", json!(2), Duration::minutes(5));
        cache.set("c", json!(3), Duration::minutes(5));
        // Touch "a" so "b" becomes least recently used
        assert_eq!(cache.get("a"), Some(json!(1)));
        cache.set("d", json!(4), Duration::minutes(5));

        let stats = cache.stats();
        assert_eq!(stats.memory_keys, vec!["a", "c", "d"]);
        for key in ["a", "c", "d"] {
            assert!(cache.get(key).is_some());
        }
    }

    #[test]
    fn test_large_payload_stays_memory_only() {
        let (cache, _, _) = store_with(CacheConfig {
            small_payload_threshold: 16,
            ..Default::default()
        });
        cache.set("small", json!("tiny"), Duration::minutes(5));
        cache.set("big", json!("x".repeat(64)), Duration::minutes(5));

        let stats = cache.stats();
        assert_eq!(stats.memory_entries, 2);
        assert_eq!(stats.persistent_keys, vec!["small"]);
    }

    #[test]
    fn test_growing_payload_drops_stale_persistent_copy() {
        let (cache, _, _) = store_with(CacheConfig {
            small_payload_threshold: 16,
            ..Default::default()
        });
        cache.set("k", json!("tiny"), Duration::minutes(5));
        cache.set("k", json!("x".repeat(64)), Duration::minutes(5));
        assert!(cache.stats().persistent_keys.is_empty());
    }

    #[test]
    fn test_over_budget_purges_expired_then_persists() {
        let (cache, clock, _) = store_with(CacheConfig {
            max_persistent_bytes: 400,
            ..Default::default()
        });
        cache.set("old", json!("a".repeat(100)), Duration::seconds(1));
        clock.advance(Duration::seconds(2));
        cache.set("new", json!("b".repeat(100)), Duration::minutes(5));
        cache.set("newer", json!("c".repeat(100)), Duration::minutes(5));

        let stats = cache.stats();
        assert!(!stats.persistent_keys.contains(&"old".to_string()));
        assert!(stats.persistent_keys.contains(&"new".to_string()));
    }

    #[test]
    fn test_over_budget_skips_persist_but_keeps_memory() {
        let (cache, _, _) = store_with(CacheConfig {
            max_persistent_bytes: 250,
            ..Default::default()
        });
        cache.set("first", json!("a".repeat(100)), Duration::minutes(5));
        cache.set("second", json!("b".repeat(100)), Duration::minutes(5));

        let stats = cache.stats();
        assert_eq!(stats.persistent_keys, vec!["first"]);
        assert_eq!(stats.memory_entries, 2);
        assert_eq!(cache.get("second"), Some(json!("b".repeat(100))));
    }

    #[test]
    fn test_backend_write_failure_is_swallowed() {
        let backend = Arc::new(MemoryStore::with_capacity_bytes(10));
        let cache = CacheStore::new(backend, CacheConfig::default());
        cache.set("k", json!({"payload": "larger than ten bytes"}), Duration::minutes(5));
        assert!(cache.get("k").is_some());
        assert_eq!(cache.stats().persistent_entries, 0);
    }

    #[test]
    fn test_corrupt_persistent_entry_is_a_miss_and_removed() {
        let (cache, _, backend) = store();
        backend.set("cache_bad", "{not json").unwrap();
        assert_eq!(cache.get("bad"), None);
        assert_eq!(backend.get("cache_bad").unwrap(), None);
    }

    #[test]
    fn test_invalidate_exact_key() {
        let (cache, _, _) = store();
        cache.set("students:fetchStudents:{}", json!([]), Duration::minutes(5));
        cache.set("staff:fetchStaff:{}", json!([]), Duration::minutes(5));
        cache.invalidate("students:fetchStudents:{}");
        assert_eq!(cache.get("students:fetchStudents:{}"), None);
        assert!(cache.get("staff:fetchStaff:{}").is_some());
        assert_eq!(cache.stats().persistent_keys, vec!["staff:fetchStaff:{}"]);
    }

    #[test]
    fn test_invalidate_wildcard_only_touches_category() {
        let (cache, _, _) = store();
        cache.set("cat:one:{}", json!(1), Duration::minutes(5));
        cache.set("cat:two:{\"id\":2}", json!(2), Duration::minutes(5));
        cache.set("dog:one:{}", json!(3), Duration::minutes(5));
        cache.set("category:one:{}", json!(4), Duration::minutes(5));

        cache.invalidate("cat:*");

        let stats = cache.stats();
        assert_eq!(stats.memory_keys, vec!["category:one:{}", "dog:one:{}"]);
        assert_eq!(stats.persistent_keys, vec!["category:one:{}", "dog:one:{}"]);
    }

    #[test]
    fn test_students_list_cached_then_invalidated() {
        let (cache, clock, _) = store();
        let key = "students:fetchStudents:{}";
        cache.set(key, json!(["Kim", "Lee"]), Duration::minutes(30));

        clock.advance(Duration::minutes(5));
        assert_eq!(cache.get(key), Some(json!(["Kim", "Lee"])));

        cache.invalidate("students:*");
        assert_eq!(cache.get(key), None);
    }

    #[test]
    fn test_clear_empties_both_tiers_but_not_foreign_keys() {
        let (cache, _, backend) = store();
        backend.set("googleAccessToken", "{}").unwrap();
        cache.set("a", json!(1), Duration::minutes(5));
        cache.set("b", json!(2), Duration::minutes(5));
        cache.clear();

        let stats = cache.stats();
        assert_eq!(stats.memory_entries, 0);
        assert_eq!(stats.persistent_entries, 0);
        assert_eq!(backend.keys().unwrap(), vec!["googleAccessToken".to_string()]);
    }

    #[test]
    fn test_update_preserves_expiry_and_bumps_version() {
        let (cache, _, _) = store();
        cache.set("k", json!([1]), Duration::minutes(5));
        let before = cache.entry("k").unwrap();

        let snapshot = cache
            .update("k", |v| {
                let mut list = v.as_array().cloned().unwrap_or_default();
                list.push(json!(2));
                Value::Array(list)
            })
            .unwrap();
        assert_eq!(snapshot, before);

        let after = cache.entry("k").unwrap();
        assert_eq!(after.payload, json!([1, 2]));
        assert_eq!(after.expires_at, before.expires_at);
        assert_eq!(after.version, 2);

        cache.restore(snapshot);
        assert_eq!(cache.entry("k").unwrap(), before);
    }

    #[test]
    fn test_update_missing_key_is_none() {
        let (cache, _, _) = store();
        assert!(cache.update("nope", |v| v.clone()).is_none());
        assert_eq!(cache.get("nope"), None);
    }

    #[test]
    fn test_purge_expired() {
        let (cache, clock, _) = store();
        cache.set("short", json!(1), Duration::seconds(5));
        cache.set("long", json!(2), Duration::minutes(5));
        clock.advance(Duration::seconds(6));
        // Once from memory, once from the persistent tier
        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.stats().persistent_keys, vec!["long"]);
    }

    #[test]
    fn test_stats_leave_out_unpurged_expired_entries() {
        let (cache, clock, backend) = store();
        cache.set("short", json!(1), Duration::seconds(5));
        cache.set("long", json!(2), Duration::minutes(5));
        clock.advance(Duration::seconds(6));

        let stats = cache.stats();
        assert_eq!(stats.memory_keys, vec!["long"]);
        assert_eq!(stats.persistent_keys, vec!["long"]);
        // Still physically present until a purge or read
        assert!(backend.get("cache_short").unwrap().is_some());
    }

    /// Counts backend reads to check the persist path works from its index.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        reads: std::sync::atomic::AtomicUsize,
    }

    impl PersistentStore for CountingStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.reads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> anyhow::Result<()> {
            self.inner.remove(key)
        }

        fn keys(&self) -> anyhow::Result<Vec<String>> {
            self.inner.keys()
        }
    }

    #[test]
    fn test_writes_do_not_reread_persisted_entries() {
        let backend = Arc::new(CountingStore::default());
        for i in 0..5 {
            backend
                .inner
                .set(&format!("cache_seed{}", i), &format!("{{\"bad\":{}}}", i))
                .unwrap();
        }
        let cache = CacheStore::new(backend.clone(), CacheConfig::default());

        for i in 0..20 {
            cache.set(&format!("k{}", i), json!(i), Duration::minutes(5));
        }
        cache.stats();
        cache.purge_expired();
        // One read per pre-existing entry while indexing, none afterwards
        assert_eq!(backend.reads.load(std::sync::atomic::Ordering::SeqCst), 5);
    }

    #[test]
    fn test_long_key_persists_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FileStore::new(dir.path().to_path_buf()).unwrap());
        let key = crate::cache::policy::derive_key(
            "accounting",
            "getLedgerEntries",
            &json!({
                "spreadsheetId": "1AbCdEfGhIjKlMnOpQrStUvWxYz0123456789-abcdefghij",
                "sheetName": "2026 operating ledger",
                "range": "A1:Z5000",
            }),
        );
        assert!(key.len() > 121);

        let cache = CacheStore::new(backend.clone(), CacheConfig::default());
        cache.set(&key, json!([{"amount": 12}]), Duration::minutes(5));
        assert_eq!(cache.stats().persistent_entries, 1);
        drop(cache);

        let reopened = CacheStore::new(backend, CacheConfig::default());
        assert_eq!(reopened.get(&key), Some(json!([{"amount": 12}])));
    }

    #[test]
    fn test_file_backed_cache_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FileStore::new(dir.path().to_path_buf()).unwrap());
        let cache = CacheStore::new(backend.clone(), CacheConfig::default());
        cache.set("students:fetchStudents:{}", json!(["s1", "s2"]), Duration::minutes(5));
        drop(cache);

        let reopened = CacheStore::new(backend, CacheConfig::default());
        assert_eq!(
            reopened.get("students:fetchStudents:{}"),
            Some(json!(["s1", "s2"]))
        );
    }
}
