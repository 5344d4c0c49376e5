//! In-memory mirror of all known ClusterSecrets, keyed by UID (spec §4.4).
//!
//! Grounded on `original_source/src/cache.py`'s `Cache` ABC + `MemoryCache`:
//! the same small, total interface (get/put/delete/iterate/has), specified
//! here as a Rust trait (Design Note 3) so an alternative backing store
//! could be swapped in without touching callers, with a
//! `std::sync::Mutex`-backed default implementation satisfying the
//! "never hold the lock across I/O" rule in spec §5 structurally: every
//! method below takes the lock, does no `.await`, and returns owned data.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use crate::crd::ClusterSecret;

/// `(uid, name, body, syncedNamespaces)` — spec §3.1.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub uid: String,
    pub name: String,
    pub body: ClusterSecret,
    pub synced_namespaces: BTreeSet<String>,
}

pub trait Cache: Send + Sync {
    fn get(&self, uid: &str) -> Option<CacheEntry>;
    fn put(&self, entry: CacheEntry);
    fn delete(&self, uid: &str);
    /// A consistent snapshot, not a live view — safe to iterate while other
    /// threads mutate the cache concurrently (spec §4.4).
    fn iterate_all(&self) -> Vec<CacheEntry>;
    fn has(&self, uid: &str) -> bool {
        self.get(uid).is_some()
    }
}

#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for InMemoryCache {
    fn get(&self, uid: &str) -> Option<CacheEntry> {
        self.entries.lock().expect("cache mutex poisoned").get(uid).cloned()
    }

    fn put(&self, entry: CacheEntry) {
        self.entries
            .lock()
            .expect("cache mutex poisoned")
            .insert(entry.uid.clone(), entry);
    }

    fn delete(&self, uid: &str) {
        self.entries.lock().expect("cache mutex poisoned").remove(uid);
    }

    fn iterate_all(&self) -> Vec<CacheEntry> {
        self.entries
            .lock()
            .expect("cache mutex poisoned")
            .values()
            .cloned()
            .collect()
    }
}
