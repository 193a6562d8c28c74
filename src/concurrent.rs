//! Concurrency-Safe Bag Implementation
//!
//! This module provides [`ConcurrentBag`], the thread-safe variant of the
//! singleton bag, built from two pieces:
//!
//! - `bag` — segmented `Key → Slot` storage using hash-based sharding,
//!   where each segment is protected by its own `parking_lot::Mutex` and
//!   operations only lock the relevant segment.
//! - `slot` — the per-key compute-once holder: a condvar-backed cell for
//!   synchronous factories and a `futures` shared future for asynchronous
//!   ones.
//!
//! # Why Mutex Instead of RwLock?
//!
//! The segment maps see almost exclusively mutating traffic: a lookup that
//! misses immediately becomes an insert, and a failure becomes a removal.
//! The locks are held for single map operations measured in nanoseconds
//! (the expensive work, the factory, always runs outside them), so the
//! extra bookkeeping of `RwLock` buys nothing here. Concurrency between
//! unrelated keys comes from segmentation instead.
//!
//! # Default Segment Count
//!
//! By default the bag uses [`default_segment_count`] segments, which keeps
//! contention low for composition-root workloads (tens to hundreds of keys)
//! without meaningful memory overhead. Use
//! [`ConcurrentBag::with_segments`] to customize.

mod bag;
mod slot;

pub use self::bag::ConcurrentBag;

/// Returns the default number of segments for a [`ConcurrentBag`].
///
/// This provides a good balance between parallelism and memory overhead.
#[inline]
pub fn default_segment_count() -> usize {
    // A fixed, hardware-independent default; bags hold few keys and the
    // critical sections are tiny.
    16
}
