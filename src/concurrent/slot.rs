//! Per-Key Holder State Machine
//!
//! A [`Slot`] is the unit a [`ConcurrentBag`](super::ConcurrentBag) maps a
//! key to. It exists so the bag can promise two things at once:
//!
//! 1. **At-most-once execution** — however many callers race on one key,
//!    exactly one factory runs; everyone else waits for (and shares) its
//!    outcome.
//! 2. **Identity-based eviction** — a failed slot is removed from the map
//!    *only if the map still holds that exact slot instance*, so a failed
//!    attempt can never clobber a newer entry installed by a racing caller.
//!
//! # Shapes
//!
//! A slot's shape is fixed when it is installed and never changes:
//!
//! - **Direct** — a compute-once [`Cell`] for synchronous factories:
//!
//!   ```text
//!   Uncomputed ──▶ Computing ──▶ Done(value)
//!                      │
//!                      └───────▶ Failed(cause)   (slot then evicted)
//!   ```
//!
//!   The first caller to force the cell flips it to `Computing`, drops the
//!   lock, and runs the factory; racing callers block on a condvar. Every
//!   waiter on a failed attempt observes the same failure.
//!
//! - **Deferred** — a [`Shared`] boxed future for asynchronous factories.
//!   `Shared` already is a compute-once state machine: the inner future is
//!   driven by whichever awaiter polls first, all clones resolve to one
//!   cloned outcome, and nothing runs until the first poll. Panics inside
//!   the factory future are caught and surfaced as [`Failure::Panicked`] so
//!   that every awaiter sees the same terminal state.
//!
//! Requesting the wrong shape (calling `get` on a key installed by
//! `get_async`, or vice versa) is a programming error and panics; the two
//! entry points memoize different things (a value vs. an operation) and
//! silently converting between them would block an async task or spin up a
//! hidden executor.
//!
//! # Type Erasure
//!
//! Stored values and stored factory errors are `Arc<dyn Any + Send + Sync>`.
//! The bag downcasts them back at its API boundary; a value mismatch is
//! structurally impossible because the [`Key`](crate::Key) encodes the value
//! type, and an error mismatch means racing callers disagreed on `E` for one
//! key, which is likewise a caller bug. Both panic loudly rather than
//! corrupt the cache.

extern crate alloc;
extern crate std;

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::any::Any;
use futures::future::{BoxFuture, Shared};
use parking_lot::{Condvar, Mutex};

use crate::key::Key;

/// Type-erased, shareable successfully computed value.
pub(crate) type StoredValue = Arc<dyn Any + Send + Sync>;

/// Type-erased, shareable factory error.
pub(crate) type StoredError = Arc<dyn Any + Send + Sync>;

/// The shared asynchronous computation behind a deferred slot.
pub(crate) type SharedComputation = Shared<BoxFuture<'static, Result<StoredValue, Failure>>>;

/// Terminal failure of a computation, shared by every observer.
#[derive(Clone)]
pub(crate) enum Failure {
    /// The factory returned this error.
    Error(StoredError),
    /// The factory panicked in the caller that ran it.
    Panicked,
}

/// What [`Cell::force`] reports when it does not produce a value.
pub(crate) enum ForceFailed {
    /// The factory (this caller's or a racing caller's) returned this error.
    Error(StoredError),
    /// A racing caller's factory panicked.
    Panicked,
    /// This caller's own factory panicked; the payload is handed back so the
    /// bag can evict the slot before resuming the unwind.
    Unwind(Box<dyn Any + Send>),
}

impl core::fmt::Debug for ForceFailed {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Error(_) => f.write_str("ForceFailed::Error(..)"),
            Self::Panicked => f.write_str("ForceFailed::Panicked"),
            Self::Unwind(_) => f.write_str("ForceFailed::Unwind(..)"),
        }
    }
}

enum CellState {
    Uncomputed,
    Computing,
    Done(StoredValue),
    Failed(Failure),
}

/// Compute-once cell for synchronous factories.
///
/// Exactly one forcer runs the factory; concurrent forcers block until the
/// computation reaches a terminal state and then share it. The cell itself
/// never resets; retry semantics come from the bag evicting a failed slot
/// and installing a fresh one.
pub(crate) struct Cell {
    state: Mutex<CellState>,
    done: Condvar,
}

impl Cell {
    fn new() -> Self {
        Cell {
            state: Mutex::new(CellState::Uncomputed),
            done: Condvar::new(),
        }
    }

    /// Forces the cell, running `factory` if this caller wins the claim.
    ///
    /// The cell lock is never held while the factory runs; it covers only
    /// the state transitions.
    pub(crate) fn force<F>(&self, factory: F) -> Result<StoredValue, ForceFailed>
    where
        F: FnOnce() -> Result<StoredValue, StoredError>,
    {
        {
            let mut state = self.state.lock();
            loop {
                match &*state {
                    CellState::Done(value) => return Ok(Arc::clone(value)),
                    CellState::Failed(Failure::Error(error)) => {
                        return Err(ForceFailed::Error(Arc::clone(error)));
                    }
                    CellState::Failed(Failure::Panicked) => return Err(ForceFailed::Panicked),
                    CellState::Computing => self.done.wait(&mut state),
                    CellState::Uncomputed => break,
                }
            }
            *state = CellState::Computing;
        }

        // This caller holds the claim: every other forcer is now parked on
        // the condvar until a terminal state is published.
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(factory));

        let result = {
            let mut state = self.state.lock();
            match outcome {
                Ok(Ok(value)) => {
                    *state = CellState::Done(Arc::clone(&value));
                    Ok(value)
                }
                Ok(Err(error)) => {
                    *state = CellState::Failed(Failure::Error(Arc::clone(&error)));
                    Err(ForceFailed::Error(error))
                }
                Err(payload) => {
                    *state = CellState::Failed(Failure::Panicked);
                    Err(ForceFailed::Unwind(payload))
                }
            }
        };
        self.done.notify_all();
        result
    }
}

enum SlotInner {
    Direct(Cell),
    Deferred(SharedComputation),
}

/// Cheaply cloneable handle to one key's holder.
///
/// Clones share the inner allocation; [`Slot::same_instance`] compares that
/// allocation, which is what makes compare-and-remove eviction possible.
#[derive(Clone)]
pub(crate) struct Slot {
    inner: Arc<SlotInner>,
}

impl Slot {
    /// Creates a holder for a synchronous computation.
    pub(crate) fn direct() -> Self {
        Slot {
            inner: Arc::new(SlotInner::Direct(Cell::new())),
        }
    }

    /// Creates a holder around an already-wrapped shared computation.
    ///
    /// The computation has not started; `Shared` defers execution to the
    /// first poll.
    pub(crate) fn deferred(computation: SharedComputation) -> Self {
        Slot {
            inner: Arc::new(SlotInner::Deferred(computation)),
        }
    }

    /// Returns `true` if both handles refer to the same holder instance.
    pub(crate) fn same_instance(a: &Slot, b: &Slot) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// The compute-once cell of a synchronous holder.
    ///
    /// Panics if this key was installed by the asynchronous path.
    pub(crate) fn as_direct(&self, key: &Key) -> &Cell {
        match &*self.inner {
            SlotInner::Direct(cell) => cell,
            SlotInner::Deferred(_) => panic!(
                "{key:?} was installed by `get_async`; keep using the asynchronous accessors for it"
            ),
        }
    }

    /// A clone of the shared computation of an asynchronous holder.
    ///
    /// Panics if this key was installed by the synchronous path.
    pub(crate) fn as_deferred(&self, key: &Key) -> SharedComputation {
        match &*self.inner {
            SlotInner::Deferred(computation) => computation.clone(),
            SlotInner::Direct(_) => panic!(
                "{key:?} was installed by `get`; keep using the synchronous accessors for it"
            ),
        }
    }
}

/// Recovers the typed value behind a stored entry.
///
/// The key's type component is what was used to store the value, so a
/// mismatch cannot be produced through the public API.
pub(crate) fn downcast_value<T>(key: &Key, stored: StoredValue) -> Arc<T>
where
    T: Send + Sync + 'static,
{
    match stored.downcast::<T>() {
        Ok(value) => value,
        Err(_) => panic!("value cached for {key:?} has a mismatched type"),
    }
}

/// Recovers the typed error shared by a failed attempt.
///
/// Unlike the value type, the error type is not part of the key; every
/// caller racing on one key must use the same `E`.
pub(crate) fn downcast_error<E>(key: &Key, stored: StoredError) -> Arc<E>
where
    E: Send + Sync + 'static,
{
    match stored.downcast::<E>() {
        Ok(error) => error,
        Err(_) => panic!(
            "factory error for {key:?} has a mismatched type; callers racing on one key must agree on the error type"
        ),
    }
}
