//! Counters for cache monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Cache counters, updated without taking the cache lock.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Lookups answered from a fresh entry.
    pub hits: AtomicU64,
    /// Lookups that started an upstream fetch.
    pub misses: AtomicU64,
    /// Lookups that joined another caller's in-flight fetch.
    pub coalesced: AtomicU64,
    /// Upstream fetches that failed.
    pub upstream_failures: AtomicU64,
    /// Stale entries served after an upstream failure.
    pub stale_served: AtomicU64,
    /// Entries removed for capacity.
    pub evictions: AtomicU64,
}

impl CacheMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_served(&self) {
        self.stale_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Point-in-time view of a cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub fresh_entries: usize,
    pub stale_entries: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub upstream_failures: u64,
    pub stale_served: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub(crate) fn with_counters(mut self, metrics: &CacheMetrics) -> Self {
        self.hits = metrics.hits.load(Ordering::Relaxed);
        self.misses = metrics.misses.load(Ordering::Relaxed);
        self.coalesced = metrics.coalesced.load(Ordering::Relaxed);
        self.upstream_failures = metrics.upstream_failures.load(Ordering::Relaxed);
        self.stale_served = metrics.stale_served.load(Ordering::Relaxed);
        self.evictions = metrics.evictions.load(Ordering::Relaxed);
        self
    }

    /// Hit ratio over all lookups that reached the cache.
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses + self.coalesced;
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / lookups as f64
    }
}
