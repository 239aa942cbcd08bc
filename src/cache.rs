//! Read-through cache over the disk-backed forward-index and posting
//! tiers (spec.md §4.5). Grounded on `motedb-motedb`'s
//! `cache/row_cache.rs` and `index/cached_index.rs` — a `dashmap`
//! keyed by a composite key, `Arc`-wrapped values, explicit eviction —
//! adapted here to drop LRU-style automatic eviction (spec.md §4.5
//! says eviction is explicit-only) and to gate admission through a
//! [`CircuitBreaker`] instead of a capacity counter.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::Result;
use crate::external::CircuitBreaker;
use crate::segment::SegmentKey;
use crate::space_usage::SpaceUsage;
use crate::telemetry::TimerGuard;

/// Identifies one cached entry: a segment/field plus a qualifier (term
/// bytes hex-encoded for posting entries, empty for a whole cached
/// forward-index segment).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub segment: SegmentKey,
    pub qualifier: String,
}

impl CacheKey {
    pub fn forward(segment: SegmentKey) -> Self {
        Self {
            segment,
            qualifier: String::new(),
        }
    }

    /// Keys a single forward-index entry within `segment` by `doc_id`
    /// (spec.md §4.5 per-doc population contract).
    pub fn forward_doc(segment: SegmentKey, doc_id: u32) -> Self {
        Self {
            segment,
            qualifier: format!("doc:{doc_id}"),
        }
    }

    pub fn posting(segment: SegmentKey, term: &[u8]) -> Self {
        Self {
            segment,
            qualifier: hex_encode(term),
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A read-through, explicit-eviction-only cache over values of type
/// `V`. Concurrent misses for the same key are coalesced behind a
/// per-key population lock rather than racing duplicate loads.
pub struct ReadThroughCache<V> {
    entries: DashMap<CacheKey, Arc<V>>,
    locks: DashMap<CacheKey, Arc<Mutex<()>>>,
    breaker: Arc<dyn CircuitBreaker>,
}

impl<V> ReadThroughCache<V>
where
    V: SpaceUsage + Send + Sync + 'static,
{
    pub fn new(breaker: Arc<dyn CircuitBreaker>) -> Self {
        Self {
            entries: DashMap::new(),
            locks: DashMap::new(),
            breaker,
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the cached value for `key`, populating it with `loader`
    /// on a miss. Concurrent callers racing the same key's miss block
    /// on one shared lock rather than each running `loader`.
    ///
    /// If the circuit breaker rejects the reservation for the loaded
    /// value's RAM footprint, the value is still returned to the
    /// caller but is not retained in the cache (spec.md §4.5 uncached
    /// fallback).
    pub fn get_or_load<F>(&self, key: CacheKey, loader: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(v) = self.entries.get(&key) {
            return Ok(Arc::clone(&v));
        }

        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock();

        // re-check: another thread may have populated this key while
        // we were waiting for the population lock.
        if let Some(v) = self.entries.get(&key) {
            return Ok(Arc::clone(&v));
        }

        let value = {
            let _timer = TimerGuard::start(tracing::debug_span!(
                "cache_populate",
                qualifier = %key.qualifier,
                elapsed_us = tracing::field::Empty
            ));
            loader()?
        };
        let bytes = value.ram_bytes();
        match self.breaker.reserve(bytes) {
            Ok(()) => {
                let arc = Arc::new(value);
                self.entries.insert(key, Arc::clone(&arc));
                Ok(arc)
            }
            Err(_) => {
                tracing::debug!(bytes, "cache capacity exceeded, serving uncached");
                Ok(Arc::new(value))
            }
        }
    }

    /// Drops every cached entry belonging to `segment`, releasing its
    /// reserved budget. The only eviction path besides [`Self::clear`]
    /// (spec.md §4.5).
    pub fn evict_segment(&self, segment: &SegmentKey) {
        let keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|e| &e.key().segment == segment)
            .map(|e| e.key().clone())
            .collect();
        for key in keys {
            if let Some((_, v)) = self.entries.remove(&key) {
                self.breaker.release(v.ram_bytes());
            }
            self.locks.remove(&key);
        }
    }

    /// Drops every cached entry, releasing all reserved budget.
    pub fn clear(&self) {
        let keys: Vec<CacheKey> = self.entries.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, v)) = self.entries.remove(&key) {
                self.breaker.release(v.ram_bytes());
            }
        }
        self.locks.clear();
    }
}
