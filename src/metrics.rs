//! Bag Metrics System
//!
//! Lightweight hit/miss accounting for the bags, reported through a
//! BTreeMap-based interface so different bag kinds can be inspected
//! uniformly.
//!
//! # Why BTreeMap over HashMap?
//!
//! BTreeMap keeps the reported metrics in a deterministic order, which makes
//! test assertions, log lines, and exported snapshots reproducible. With
//! three metric keys the O(log n) lookup cost is irrelevant.
//!
//! # Counter Semantics
//!
//! - **hit** — a lookup found a usable entry (a cached value, or a holder
//!   another caller already installed that this caller joined).
//! - **miss** — a lookup installed a new holder and will run (or drive) the
//!   factory.
//! - **failure** — a holder was evicted because its factory failed.
//!
//! Counters are observational only; they never influence bag behavior.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use core::sync::atomic::{AtomicU64, Ordering};

/// Common reporting interface implemented by every bag kind.
pub trait BagMetrics {
    /// Returns a snapshot of all counters, keyed by metric name.
    ///
    /// Uses BTreeMap to ensure deterministic, consistent ordering.
    fn metrics(&self) -> BTreeMap<String, f64>;

    /// Returns a short static name identifying the bag kind.
    fn bag_kind(&self) -> &'static str;
}

/// Plain counter set used by the single-threaded bag, and as the snapshot
/// form of [`SharedBagMetrics`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CoreBagMetrics {
    /// Lookups that found a usable entry.
    pub hits: u64,

    /// Lookups that installed a new holder.
    pub misses: u64,

    /// Holders evicted because their factory failed.
    pub failures: u64,
}

impl CoreBagMetrics {
    /// Creates an all-zero counter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a lookup that found a usable entry.
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    /// Records a lookup that installed a new holder.
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Records the eviction of a failed holder.
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Total number of lookups (hits + misses).
    pub fn requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Hit rate as a value between 0.0 and 1.0, or 0.0 before any request.
    pub fn hit_rate(&self) -> f64 {
        if self.requests() > 0 {
            self.hits as f64 / self.requests() as f64
        } else {
            0.0
        }
    }

    /// Converts the counters to a BTreeMap for reporting.
    pub fn to_btreemap(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        metrics.insert("failures".to_string(), self.failures as f64);
        metrics.insert("hit_rate".to_string(), self.hit_rate());
        metrics.insert("hits".to_string(), self.hits as f64);
        metrics.insert("misses".to_string(), self.misses as f64);
        metrics.insert("requests".to_string(), self.requests() as f64);
        metrics
    }
}

/// Atomic counter set used by the concurrency-safe bag.
///
/// All counters use relaxed ordering; they are statistics, not
/// synchronization.
#[derive(Debug, Default)]
pub struct SharedBagMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    failures: AtomicU64,
}

impl SharedBagMetrics {
    /// Creates an all-zero counter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a lookup that found a usable entry.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a lookup that installed a new holder.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the eviction of a failed holder.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a plain snapshot of the current counter values.
    ///
    /// Each counter is read independently, so a snapshot taken while other
    /// threads are active may be slightly torn; individual counters are
    /// always exact.
    pub fn snapshot(&self) -> CoreBagMetrics {
        CoreBagMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_counters() {
        let mut metrics = CoreBagMetrics::new();

        metrics.record_miss();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_failure();

        assert_eq!(metrics.hits, 2);
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.failures, 1);
        assert_eq!(metrics.requests(), 3);
    }

    #[test]
    fn test_hit_rate() {
        let mut metrics = CoreBagMetrics::new();
        assert_eq!(metrics.hit_rate(), 0.0);

        metrics.record_hit();
        metrics.record_miss();

        assert!((metrics.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_btreemap_keys_are_stable() {
        let metrics = CoreBagMetrics::new().to_btreemap();
        let keys: alloc::vec::Vec<_> = metrics.keys().map(String::as_str).collect();

        assert_eq!(
            keys,
            ["failures", "hit_rate", "hits", "misses", "requests"]
        );
    }

    #[test]
    fn test_shared_snapshot() {
        let metrics = SharedBagMetrics::new();

        metrics.record_miss();
        metrics.record_hit();
        metrics.record_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.hits, 1);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.failures, 1);
    }

    #[test]
    fn test_shared_counters_do_not_lose_updates() {
        let metrics = SharedBagMetrics::new();

        let mut pool = scoped_threadpool::Pool::new(4);
        pool.scoped(|scope| {
            for _ in 0..4 {
                scope.execute(|| {
                    for _ in 0..1_000 {
                        metrics.record_hit();
                    }
                });
            }
        });

        assert_eq!(metrics.snapshot().hits, 4_000);
    }
}
