//! Capacity-bounded TTL cache
//!
//! A generic expiring key/value store behind one coarse mutex per instance.
//! Expiry is lazy: an entry past its TTL is removed the next time it is
//! read. When the cache is full and a new key arrives, the entry with the
//! globally oldest insertion time is evicted first. Eviction is a full scan,
//! which is acceptable at the bounded capacities this layer runs with (tens
//! of thousands of entries).
//!
//! Absence is a normal return value; no cache operation can fail.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::CacheSettings;

// ----------------------------------------------------------------------------
// Cache Entry
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

// ----------------------------------------------------------------------------
// TTL Cache
// ----------------------------------------------------------------------------

/// Expiring key/value store with a hard capacity bound
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    max_entries: usize,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `max_entries` live entries, each
    /// expiring `ttl` after insertion
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries,
            ttl,
        }
    }

    /// Create a cache from configuration settings
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.max_entries, settings.ttl())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        // A poisoned lock only means another thread panicked mid-operation;
        // the map itself is still structurally sound.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the value for `key` if present and not yet expired. An expired
    /// entry is removed and reported as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert or overwrite `key` with a fresh timestamp. If the cache is at
    /// capacity and `key` is new, the oldest-inserted entry is evicted first.
    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.lock();
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest_key) = oldest {
                entries.remove(&oldest_key);
            }
        }
        entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Remove `key`, returning whether it was present
    pub fn remove(&self, key: &K) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Atomically empty the cache
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Drop every entry past its TTL. Expiry is otherwise lazy; the periodic
    /// sweep calls this so untouched entries do not linger.
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.lock()
            .retain(|_, entry| entry.inserted_at.elapsed() < ttl);
    }

    /// Number of entries currently held (including not-yet-purged expired ones)
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
