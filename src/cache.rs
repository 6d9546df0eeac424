//! Bounded in-process cache for parsed documents and generated reports.
//!
//! Entries expire after a fixed TTL and the oldest entry is evicted when
//! the store is full. Nothing is persisted; a restart clears everything.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

// ═══════════════════════════════════════════════════════════
// Entry
// ═══════════════════════════════════════════════════════════

struct CacheEntry<V> {
    value: Arc<V>,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= ttl
    }
}

// ═══════════════════════════════════════════════════════════
// KeyedCache
// ═══════════════════════════════════════════════════════════

type EvictionHook<V> = Box<dyn Fn(&str, &V) + Send + Sync>;

/// String-keyed store shared across request handlers.
///
/// Values are handed out as `Arc<V>` so a reader keeps its copy alive
/// even if the entry is evicted mid-request.
pub struct KeyedCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    max_entries: usize,
    ttl: Duration,
    on_evict: Option<EvictionHook<V>>,
}

impl<V> KeyedCache<V> {
    /// `max_entries` is clamped to at least 1.
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
            ttl,
            on_evict: None,
        }
    }

    /// Run `hook` for every value the cache drops on its own: expired,
    /// pushed out by the size bound, or replaced under the same key.
    /// Explicit `remove` hands the value back instead.
    pub fn with_eviction_hook(mut self, hook: impl Fn(&str, &V) + Send + Sync + 'static) -> Self {
        self.on_evict = Some(Box::new(hook));
        self
    }

    /// Insert or replace a value. Returns the number of entries evicted.
    pub fn insert(&self, key: impl Into<String>, value: V) -> usize {
        self.insert_at(key.into(), Arc::new(value), Instant::now())
    }

    /// Insert a value the caller already holds behind an `Arc`.
    pub fn insert_shared(&self, key: impl Into<String>, value: Arc<V>) -> usize {
        self.insert_at(key.into(), value, Instant::now())
    }

    /// Fetch a live entry. Expired entries are dropped on access.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        self.get_at(key, Instant::now())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&self, key: &str) -> Option<Arc<V>> {
        self.entries().remove(key).map(|e| e.value)
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    fn insert_at(&self, key: String, value: Arc<V>, now: Instant) -> usize {
        let mut entries = self.entries();
        let mut dropped = take_expired(&mut entries, self.ttl, now);

        if !entries.contains_key(&key) {
            while entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.inserted_at)
                    .map(|(k, _)| k.clone());
                let Some(k) = oldest else {
                    break;
                };
                if let Some(entry) = entries.remove(&k) {
                    dropped.push((k, entry.value));
                }
            }
        }
        let evicted = dropped.len();

        let replaced = entries.insert(
            key.clone(),
            CacheEntry {
                value,
                inserted_at: now,
            },
        );
        if let Some(old) = replaced {
            dropped.push((key, old.value));
        }
        let remaining = entries.len();
        drop(entries);

        if evicted > 0 {
            tracing::debug!(evicted, remaining, "Cache eviction");
        }
        self.notify(dropped);
        evicted
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<Arc<V>> {
        let mut entries = self.entries();
        let expired = entries.get(key)?.is_expired(self.ttl, now);
        if expired {
            let dropped: Vec<_> = entries
                .remove_entry(key)
                .map(|(k, e)| (k, e.value))
                .into_iter()
                .collect();
            drop(entries);
            self.notify(dropped);
            return None;
        }
        entries.get(key).map(|e| Arc::clone(&e.value))
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.entries();
        let dropped = take_expired(&mut entries, self.ttl, now);
        drop(entries);
        let purged = dropped.len();
        self.notify(dropped);
        purged
    }

    // Hooks run after the lock is released so they may do I/O.
    fn notify(&self, dropped: Vec<(String, Arc<V>)>) {
        if let Some(hook) = &self.on_evict {
            for (key, value) in &dropped {
                hook(key, value);
            }
        }
    }

    // A panic while holding the lock cannot leave the map half-updated,
    // so a poisoned lock is still safe to use.
    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn take_expired<V>(
    entries: &mut HashMap<String, CacheEntry<V>>,
    ttl: Duration,
    now: Instant,
) -> Vec<(String, Arc<V>)> {
    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, e)| e.is_expired(ttl, now))
        .map(|(k, _)| k.clone())
        .collect();
    expired
        .into_iter()
        .filter_map(|k| entries.remove_entry(&k))
        .map(|(k, e)| (k, e.value))
        .collect()
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
