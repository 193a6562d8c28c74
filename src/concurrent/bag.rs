//! Concurrency-Safe Singleton Bag
//!
//! [`ConcurrentBag`] has the same external contract as
//! [`SimpleBag`](crate::SimpleBag) (look up a value by label and type, run
//! the supplied factory when absent) but stays correct under arbitrary
//! concurrent callers and adds the hard guarantee: **a key's factory runs at
//! most once at a time**, and a failed attempt never poisons the key.
//!
//! # Storage Layout
//!
//! Keys are partitioned across independently locked segments, the same
//! sharding shape used by the concurrent caches this bag grew out of:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       ConcurrentBag                          │
//! │                                                              │
//! │  hash(key) % N  ──▶  Segment Selection                       │
//! │                                                              │
//! │  ┌─────────────┐ ┌─────────────┐     ┌─────────────┐         │
//! │  │  Segment 0  │ │  Segment 1  │ ... │ Segment N-1 │         │
//! │  │  ┌───────┐  │ │  ┌───────┐  │     │  ┌───────┐  │         │
//! │  │  │ Mutex │  │ │  │ Mutex │  │     │  │ Mutex │  │         │
//! │  │  └───┬───┘  │ │  └───┬───┘  │     │  └───┬───┘  │         │
//! │  │  Key ▼ Slot │ │  Key ▼ Slot │     │  Key ▼ Slot │         │
//! │  └─────────────┘ └─────────────┘     └─────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Segment locks cover map bookkeeping only: lookup, insert-if-absent, and
//! compare-and-remove. **No segment lock is ever held while a factory
//! runs**; holding one would serialize unrelated keys and deadlock a
//! factory that re-enters the bag. Waiting for a racing computation happens
//! inside the key's own [slot](super::slot), off the map locks.
//!
//! # Per-Key State Machine
//!
//! ```text
//!              insert-if-absent           factory succeeds
//!   Absent ─────────────────▶ Pending ─────────────────▶ Resolved
//!     ▲                          │                      (cached forever)
//!     │     compare-and-remove   │ factory fails
//!     └──────────────────────────┘ (all waiters observe the failure)
//! ```
//!
//! Eviction compares slot *identity*, not just the key: under races a
//! failing slot may already have been replaced by a fresh, possibly
//! successful attempt, and deleting blindly by key would wipe that
//! legitimate entry out.
//!
//! A key under persistent failure simply oscillates Absent ⇄ Pending, one
//! fresh attempt per call. There is no retry limit and no backoff; retry
//! policy belongs to the caller.
//!
//! # Thread Safety
//!
//! `ConcurrentBag` is `Send + Sync` and is typically shared via `Arc`. The
//! synchronous [`get`](ConcurrentBag::get) may block the calling thread
//! while the winning caller computes; [`get_async`](ConcurrentBag::get_async)
//! suspends cooperatively instead and never blocks a worker thread while
//! waiting.
//!
//! # Example
//!
//! ```rust,ignore
//! use singleton_bag::ConcurrentBag;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let bag = Arc::new(ConcurrentBag::new());
//!
//! let handles: Vec<_> = (0..8)
//!     .map(|_| {
//!         let bag = Arc::clone(&bag);
//!         thread::spawn(move || {
//!             // All eight threads share one factory invocation.
//!             bag.get("routing_table", build_routing_table).unwrap()
//!         })
//!     })
//!     .collect();
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! ```

extern crate alloc;
extern crate std;

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::convert::Infallible;
use core::future::Future;
use core::hash::BuildHasher;

use futures::future::FutureExt;
use parking_lot::{Mutex, MutexGuard};

#[cfg(feature = "hashbrown")]
use hashbrown::hash_map::Entry;
#[cfg(feature = "hashbrown")]
use hashbrown::{DefaultHashBuilder, HashMap};

#[cfg(not(feature = "hashbrown"))]
use std::collections::hash_map::{Entry, RandomState as DefaultHashBuilder};
#[cfg(not(feature = "hashbrown"))]
use std::collections::HashMap;

use super::default_segment_count;
use super::slot::{
    downcast_error, downcast_value, Failure, ForceFailed, Slot, StoredError, StoredValue,
};
use crate::error::{KeyError, TryGetError};
use crate::key::Key;
use crate::metrics::{BagMetrics, SharedBagMetrics};

type Segment<S> = Mutex<HashMap<Key, Slot, S>>;

/// A concurrency-safe mapping from [`Key`] to a compute-once holder.
///
/// See the [module documentation](self) for the storage layout and the
/// per-key state machine. Values are handed back as `Arc<T>`: every caller,
/// current and future, receives a handle to the single instance the winning
/// factory produced.
///
/// # Type Parameters
///
/// - `S`: Hash builder used for segment selection and the segment maps.
///   Defaults to `DefaultHashBuilder`.
///
/// # Example
///
/// ```
/// use singleton_bag::ConcurrentBag;
///
/// let bag = ConcurrentBag::new();
///
/// let first = bag.get("limit", || 128u32).unwrap();
/// let second = bag.get("limit", || 999u32).unwrap();
///
/// assert_eq!(*second, 128);
/// assert!(std::sync::Arc::ptr_eq(&first, &second));
/// ```
pub struct ConcurrentBag<S = DefaultHashBuilder> {
    segments: Box<[Segment<S>]>,
    hash_builder: S,
    metrics: SharedBagMetrics,
}

impl ConcurrentBag<DefaultHashBuilder> {
    /// Creates an empty bag with [`default_segment_count`] segments.
    pub fn new() -> Self {
        Self::with_segments(default_segment_count())
    }

    /// Creates an empty bag with an explicit segment count.
    ///
    /// More segments mean less contention between unrelated keys; a count
    /// of zero is treated as one.
    pub fn with_segments(segments: usize) -> Self {
        Self::with_hasher(segments, DefaultHashBuilder::default())
    }
}

impl Default for ConcurrentBag<DefaultHashBuilder> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ConcurrentBag<S>
where
    S: BuildHasher + Clone,
{
    /// Creates an empty bag with an explicit segment count and a custom
    /// hash builder (cloned into each segment).
    pub fn with_hasher(segments: usize, hash_builder: S) -> Self {
        let segments: Vec<_> = (0..segments.max(1))
            .map(|_| Mutex::new(HashMap::with_hasher(hash_builder.clone())))
            .collect();

        ConcurrentBag {
            segments: segments.into_boxed_slice(),
            hash_builder,
            metrics: SharedBagMetrics::new(),
        }
    }

    /// Returns the number of segments in the bag.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Returns the total number of entries across all segments.
    ///
    /// Pending holders count as entries. The value may be slightly stale
    /// under concurrent use, since segments are locked one at a time.
    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.lock().len()).sum()
    }

    /// Returns `true` if the bag holds no entries.
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.lock().is_empty())
    }

    /// Returns `true` if an entry (resolved or pending) exists for a value
    /// of type `T` under `label`.
    ///
    /// An empty label addresses nothing, so it reports `false`.
    pub fn contains<T: 'static>(&self, label: &str) -> bool {
        match Key::of::<T>(label) {
            Ok(key) => self.segment(&key).contains_key(&key),
            Err(_) => false,
        }
    }

    /// Returns a plain snapshot of this bag's hit/miss/failure counters.
    pub fn metrics_snapshot(&self) -> crate::metrics::CoreBagMetrics {
        self.metrics.snapshot()
    }

    /// Returns the value cached under `Key(label, T)`, running `factory` to
    /// create it if this caller is the first.
    ///
    /// When several threads race on one absent key, exactly one factory
    /// runs; the other callers block until it finishes and share its value.
    /// After the first success the factory argument is never invoked again
    /// for this key.
    ///
    /// A panicking factory behaves like a failure: the holder is evicted
    /// (so the next call retries), the panic resumes in the winning caller,
    /// and any caller that was blocked on the attempt panics with a message
    /// naming the key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::EmptyLabel`] if `label` is empty.
    ///
    /// # Panics
    ///
    /// Panics if this key was installed by [`get_async`](Self::get_async):
    /// a key is either a synchronous or an asynchronous singleton, never
    /// both.
    pub fn get<T, F>(&self, label: &str, factory: F) -> Result<Arc<T>, KeyError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        self.try_get(label, || Ok::<T, Infallible>(factory()))
            .map_err(|error| match error {
                TryGetError::Key(key_error) => key_error,
                TryGetError::Factory(_) => {
                    unreachable!("an infallible factory cannot produce an error")
                }
            })
    }

    /// Fallible form of [`get`](Self::get).
    ///
    /// A failed attempt is shared: every caller blocked on it receives a
    /// handle to the same error value, which is why the factory error comes
    /// back as `Arc<E>`. The failed holder is evicted before the error is
    /// returned, so the next call for this key starts a fresh attempt with
    /// its own factory.
    ///
    /// All callers racing on one key must agree on `E`; observing a racing
    /// failure of a different error type is a programming error and panics.
    ///
    /// # Errors
    ///
    /// [`TryGetError::Key`] for an empty label, [`TryGetError::Factory`]
    /// for a factory failure (this caller's or the racing winner's).
    pub fn try_get<T, E, F>(&self, label: &str, factory: F) -> Result<Arc<T>, TryGetError<Arc<E>>>
    where
        T: Send + Sync + 'static,
        E: Send + Sync + 'static,
        F: FnOnce() -> Result<T, E>,
    {
        let key = Key::of::<T>(label)?;
        let slot = self.direct_slot(&key);

        let forced = slot.as_direct(&key).force(|| match factory() {
            Ok(value) => Ok(Arc::new(value) as StoredValue),
            Err(error) => Err(Arc::new(error) as StoredError),
        });

        match forced {
            Ok(value) => Ok(downcast_value(&key, value)),
            Err(failed) => {
                self.evict(&key, &slot);
                match failed {
                    ForceFailed::Error(error) => {
                        Err(TryGetError::Factory(downcast_error(&key, error)))
                    }
                    ForceFailed::Panicked => {
                        panic!("factory for {key:?} panicked in a racing caller")
                    }
                    ForceFailed::Unwind(payload) => std::panic::resume_unwind(payload),
                }
            }
        }
    }

    /// Asynchronous form of [`get`](Self::get).
    ///
    /// The unit of memoization here is the *operation*: on a miss the
    /// factory's future is installed behind a shared, single-execution
    /// handle, and every caller, current and future, awaits that same
    /// underlying operation. The factory closure is only invoked when this
    /// call installs the holder; a racing loser's future is dropped without
    /// ever being polled.
    ///
    /// Awaiting suspends the task cooperatively; no thread blocks while the
    /// shared operation is in flight. Once it resolves, the value is cached
    /// and later calls return it without re-awaiting anything.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::EmptyLabel`] if `label` is empty, before the
    /// factory is invoked.
    ///
    /// # Panics
    ///
    /// Panics if this key was installed by [`get`](Self::get), or if the
    /// shared factory future panicked (every awaiter observes that panic).
    pub async fn get_async<T, F, Fut>(&self, label: &str, factory: F) -> Result<Arc<T>, KeyError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        self.try_get_async(label, || factory().map(Ok::<T, Infallible>))
            .await
            .map_err(|error| match error {
                TryGetError::Key(key_error) => key_error,
                TryGetError::Factory(_) => {
                    unreachable!("an infallible factory cannot produce an error")
                }
            })
    }

    /// Fallible asynchronous form of [`get`](Self::get).
    ///
    /// A rejected attempt is shared: every awaiter of the failed operation
    /// receives a handle to the same error value as `Arc<E>`. The holder is
    /// evicted before the rejection is surfaced, so the next call for this
    /// key re-attempts with its own factory. A cancellation signal surfaced
    /// by the factory as an error travels this exact path.
    ///
    /// Dropping one awaiter does not abort the shared operation; the
    /// remaining awaiters (or the next caller) continue to drive it.
    ///
    /// # Errors
    ///
    /// [`TryGetError::Key`] for an empty label, [`TryGetError::Factory`]
    /// for a rejected factory future.
    pub async fn try_get_async<T, E, F, Fut>(
        &self,
        label: &str,
        factory: F,
    ) -> Result<Arc<T>, TryGetError<Arc<E>>>
    where
        T: Send + Sync + 'static,
        E: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let key = Key::of::<T>(label)?;
        let slot = match self.lookup(&key) {
            Some(existing) => {
                self.metrics.record_hit();
                existing
            }
            None => self.install_deferred(&key, factory),
        };

        match slot.as_deferred(&key).await {
            Ok(value) => Ok(downcast_value(&key, value)),
            Err(failure) => {
                self.evict(&key, &slot);
                match failure {
                    Failure::Error(error) => {
                        Err(TryGetError::Factory(downcast_error(&key, error)))
                    }
                    Failure::Panicked => {
                        panic!("asynchronous factory for {key:?} panicked")
                    }
                }
            }
        }
    }

    /// Locks and returns the segment responsible for `key`.
    fn segment(&self, key: &Key) -> MutexGuard<'_, HashMap<Key, Slot, S>> {
        let index = (self.hash_builder.hash_one(key) as usize) % self.segments.len();
        self.segments[index].lock()
    }

    /// Returns the current holder for `key`, if any.
    fn lookup(&self, key: &Key) -> Option<Slot> {
        self.segment(key).get(key).cloned()
    }

    /// Looks up or installs the synchronous holder for `key`.
    ///
    /// Insert-if-absent: racing callers converge on whichever holder landed
    /// first, so one key never has two holders racing to run a factory.
    fn direct_slot(&self, key: &Key) -> Slot {
        let mut segment = self.segment(key);
        match segment.entry(key.clone()) {
            Entry::Occupied(existing) => {
                self.metrics.record_hit();
                existing.get().clone()
            }
            Entry::Vacant(vacant) => {
                self.metrics.record_miss();
                vacant.insert(Slot::direct()).clone()
            }
        }
    }

    /// Builds the shared computation for `key` and installs it, keeping an
    /// existing holder if a racing caller got there first.
    ///
    /// The loser's computation is dropped here without having been polled,
    /// so its factory body never runs.
    fn install_deferred<T, E, F, Fut>(&self, key: &Key, factory: F) -> Slot
    where
        T: Send + Sync + 'static,
        E: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let future = factory();
        let computation = async move {
            match std::panic::AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(value)) => Ok(Arc::new(value) as StoredValue),
                Ok(Err(error)) => Err(Failure::Error(Arc::new(error) as StoredError)),
                Err(_payload) => Err(Failure::Panicked),
            }
        }
        .boxed()
        .shared();
        let candidate = Slot::deferred(computation);

        let mut segment = self.segment(key);
        match segment.entry(key.clone()) {
            Entry::Occupied(existing) => {
                self.metrics.record_hit();
                existing.get().clone()
            }
            Entry::Vacant(vacant) => {
                self.metrics.record_miss();
                vacant.insert(candidate).clone()
            }
        }
    }

    /// Removes the entry for `key` only if it still holds exactly `slot`.
    ///
    /// Compare-and-remove by identity: a holder that was already superseded
    /// by a newer entry must not evict that entry.
    fn evict(&self, key: &Key, slot: &Slot) {
        let mut segment = self.segment(key);
        if segment
            .get(key)
            .is_some_and(|current| Slot::same_instance(current, slot))
        {
            segment.remove(key);
            self.metrics.record_failure();
        }
    }
}

impl<S> BagMetrics for ConcurrentBag<S>
where
    S: BuildHasher + Clone,
{
    fn metrics(&self) -> alloc::collections::BTreeMap<alloc::string::String, f64> {
        self.metrics.snapshot().to_btreemap()
    }

    fn bag_kind(&self) -> &'static str {
        "ConcurrentBag"
    }
}

impl<S> core::fmt::Debug for ConcurrentBag<S>
where
    S: BuildHasher + Clone,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConcurrentBag")
            .field("segment_count", &self.segments.len())
            .field("total_len", &self.len())
            .finish()
    }
}
