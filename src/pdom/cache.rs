//! In-memory accelerators owned by an index.
//!
//! Every cache here is bounded (LRU) and invalidated by the mutation that could change its
//! answer. None of them is a source of truth: a disabled cache (capacity zero) yields the
//! same results, only slower.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;

use super::location::IndexLocation;
use super::options::PdomOptions;
use crate::types::{LinkageId, RecPtr};

/// Key of the name to bindings cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BindingCacheKey {
    /// Linkage the lookup ran in.
    pub linkage: LinkageId,
    /// Name as looked up; lower-cased for case-insensitive lookups.
    pub name: Vec<u8>,
    /// Whether the lookup was case sensitive.
    pub case_sensitive: bool,
}

impl BindingCacheKey {
    /// Key for a lookup of `name`.
    pub fn new(linkage: LinkageId, name: &[u8], case_sensitive: bool) -> Self {
        let name = if case_sensitive {
            name.to_vec()
        } else {
            name.to_ascii_lowercase()
        };
        Self {
            linkage,
            name,
            case_sensitive,
        }
    }
}

/// Hit and miss counters of one cache.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheCounters {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that had to go to the store.
    pub misses: u64,
    /// Entries dropped by invalidation.
    pub invalidations: u64,
}

struct Bounded<K: Hash + Eq, V> {
    entries: Option<Mutex<LruCache<K, V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl<K: Hash + Eq, V: Clone> Bounded<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.as_ref()?;
        let found = entries.lock().get(key).cloned();
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    fn put(&self, key: K, value: V) {
        if let Some(entries) = self.entries.as_ref() {
            entries.lock().put(key, value);
        }
    }

    fn invalidate(&self, key: &K) {
        if let Some(entries) = self.entries.as_ref() {
            if entries.lock().pop(key).is_some() {
                self.invalidations.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn clear(&self) {
        if let Some(entries) = self.entries.as_ref() {
            entries.lock().clear();
        }
    }

    fn counters(&self) -> CacheCounters {
        CacheCounters {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of all cache counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    /// Name to bindings cache.
    pub bindings: CacheCounters,
    /// Name to macro container cache.
    pub macro_containers: CacheCounters,
    /// Location string cache.
    pub locations: CacheCounters,
}

/// Caches of one index.
pub struct PdomCaches {
    bindings: Bounded<BindingCacheKey, Arc<[RecPtr]>>,
    macro_containers: Bounded<(LinkageId, Vec<u8>), RecPtr>,
    locations: Bounded<String, IndexLocation>,
}

impl PdomCaches {
    /// Creates caches sized by `options`.
    pub fn new(options: &PdomOptions) -> Self {
        Self {
            bindings: Bounded::new(options.binding_cache_capacity),
            macro_containers: Bounded::new(options.macro_cache_capacity),
            locations: Bounded::new(options.location_cache_capacity),
        }
    }

    /// Cached bindings for `key`.
    pub fn bindings(&self, key: &BindingCacheKey) -> Option<Arc<[RecPtr]>> {
        self.bindings.get(key)
    }

    /// Remembers the bindings found for `key`.
    pub fn put_bindings(&self, key: BindingCacheKey, records: Arc<[RecPtr]>) {
        self.bindings.put(key, records);
    }

    /// Drops every cached lookup whose answer may include a binding called `name`.
    pub fn invalidate_bindings(&self, linkage: LinkageId, name: &[u8]) {
        trace!(linkage = %linkage, name = %String::from_utf8_lossy(name), "pdom.cache.invalidate_bindings");
        self.bindings
            .invalidate(&BindingCacheKey::new(linkage, name, true));
        self.bindings
            .invalidate(&BindingCacheKey::new(linkage, name, false));
    }

    /// Cached macro container for `name`.
    pub fn macro_container(&self, linkage: LinkageId, name: &[u8]) -> Option<RecPtr> {
        self.macro_containers.get(&(linkage, name.to_vec()))
    }

    /// Remembers the container of `name`.
    pub fn put_macro_container(&self, linkage: LinkageId, name: &[u8], container: RecPtr) {
        self.macro_containers.put((linkage, name.to_vec()), container);
    }

    /// Forgets the container of `name`.
    pub fn invalidate_macro_container(&self, linkage: LinkageId, name: &[u8]) {
        self.macro_containers.invalidate(&(linkage, name.to_vec()));
    }

    /// Cached decoded location.
    pub fn location(&self, internal: &str) -> Option<IndexLocation> {
        self.locations.get(&internal.to_string())
    }

    /// Remembers a decoded location.
    pub fn put_location(&self, internal: String, location: IndexLocation) {
        self.locations.put(internal, location);
    }

    /// Drops every entry of every cache.
    pub fn clear(&self) {
        self.bindings.clear();
        self.macro_containers.clear();
        self.locations.clear();
    }

    /// Counters of every cache.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            bindings: self.bindings.counters(),
            macro_containers: self.macro_containers.counters(),
            locations: self.locations.counters(),
        }
    }
}
