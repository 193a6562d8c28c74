//! Single-Threaded Singleton Bag
//!
//! [`SimpleBag`] is the no-concurrency variant of the bag: a plain map from
//! [`Key`] to an already-materialized value. There is no holder state
//! machine and no locking; a lookup either returns the cached value or runs
//! the factory right there and stores the result.
//!
//! # Semantics
//!
//! - A hit returns the identical instance stored by the first successful
//!   call (an [`Rc`] to the same allocation).
//! - A miss runs the factory synchronously (or awaits it on the async path)
//!   and stores the produced value, not a pending computation.
//! - A factory error or panic propagates to the caller and stores nothing,
//!   so the next call for that key runs its factory again.
//!
//! # Thread Safety
//!
//! This type is deliberately `!Send` and `!Sync` (it stores `Rc` values
//! behind a `RefCell`), so "single-threaded or externally-synchronized use
//! only" is enforced by the compiler instead of documentation. For
//! concurrent callers use
//! [`ConcurrentBag`](crate::concurrent::ConcurrentBag).
//!
//! # Reentrancy
//!
//! No borrow is held while a factory runs, so a factory may call back into
//! the bag for other keys. A reentrant store under the *same* key is
//! last-write-wins.
//!
//! # Example
//!
//! ```
//! use singleton_bag::SimpleBag;
//!
//! let bag = SimpleBag::new();
//!
//! let first = bag.get("answer", || 42u32).unwrap();
//! // The factory is gone; the cached value wins.
//! let second = bag.get("answer", || 99u32).unwrap();
//!
//! assert_eq!(*second, 42);
//! assert!(std::rc::Rc::ptr_eq(&first, &second));
//! ```

extern crate alloc;

use alloc::rc::Rc;
use core::any::Any;
use core::cell::RefCell;
use core::convert::Infallible;
use core::future::Future;

#[cfg(feature = "hashbrown")]
use hashbrown::HashMap;

#[cfg(not(feature = "hashbrown"))]
use std::collections::HashMap;

use crate::error::{KeyError, TryGetError};
use crate::key::Key;
use crate::metrics::{BagMetrics, CoreBagMetrics};

/// A single-threaded mapping from [`Key`] to a lazily created value.
///
/// Values are stored type-erased and handed back as `Rc<T>`; the `Rc` is
/// what makes "every call returns the identical instance" literal. See the
/// [module documentation](self) for semantics.
pub struct SimpleBag {
    content: RefCell<HashMap<Key, Rc<dyn Any>>>,
    metrics: RefCell<CoreBagMetrics>,
}

impl SimpleBag {
    /// Creates an empty bag.
    pub fn new() -> Self {
        SimpleBag {
            content: RefCell::new(HashMap::new()),
            metrics: RefCell::new(CoreBagMetrics::new()),
        }
    }

    /// Creates an empty bag with map capacity preallocated for roughly
    /// `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        SimpleBag {
            content: RefCell::new(HashMap::with_capacity(capacity)),
            metrics: RefCell::new(CoreBagMetrics::new()),
        }
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.content.borrow().len()
    }

    /// Returns `true` if no entry has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.content.borrow().is_empty()
    }

    /// Returns `true` if a value of type `T` is cached under `label`.
    ///
    /// An empty label addresses nothing, so it reports `false`.
    pub fn contains<T: 'static>(&self, label: &str) -> bool {
        match Key::of::<T>(label) {
            Ok(key) => self.content.borrow().contains_key(&key),
            Err(_) => false,
        }
    }

    /// Returns the value cached under `Key(label, T)`, running `factory` to
    /// create it on the first call.
    ///
    /// Every call for the same key returns the identical instance; after the
    /// first success the factory argument is never invoked again.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::EmptyLabel`] if `label` is empty.
    pub fn get<T, F>(&self, label: &str, factory: F) -> Result<Rc<T>, KeyError>
    where
        T: 'static,
        F: FnOnce() -> T,
    {
        self.try_get(label, || Ok::<T, Infallible>(factory()))
            .map_err(|error| match error {
                TryGetError::Key(key_error) => key_error,
                TryGetError::Factory(never) => match never {},
            })
    }

    /// Fallible form of [`get`](Self::get).
    ///
    /// If the factory returns `Err`, the error passes through unchanged and
    /// nothing is stored: the next call for this key runs its factory again.
    ///
    /// # Errors
    ///
    /// [`TryGetError::Key`] for an empty label, [`TryGetError::Factory`] for
    /// a factory failure.
    pub fn try_get<T, E, F>(&self, label: &str, factory: F) -> Result<Rc<T>, TryGetError<E>>
    where
        T: 'static,
        F: FnOnce() -> Result<T, E>,
    {
        let key = Key::of::<T>(label)?;
        if let Some(existing) = self.content.borrow().get(&key) {
            self.metrics.borrow_mut().record_hit();
            return Ok(downcast_stored(&key, Rc::clone(existing)));
        }

        self.metrics.borrow_mut().record_miss();
        let value = match factory() {
            Ok(value) => Rc::new(value),
            Err(error) => {
                self.metrics.borrow_mut().record_failure();
                return Err(TryGetError::Factory(error));
            }
        };
        let erased: Rc<dyn Any> = value.clone();
        self.content.borrow_mut().insert(key, erased);
        Ok(value)
    }

    /// Asynchronous form of [`get`](Self::get).
    ///
    /// On a miss the factory's future is awaited and the *resolved* value is
    /// stored, never the pending future; a second caller arriving before the
    /// first resolves will run its own factory (this bag makes no
    /// concurrency promises).
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::EmptyLabel`] if `label` is empty, before the
    /// factory is invoked.
    pub async fn get_async<T, F, Fut>(&self, label: &str, factory: F) -> Result<Rc<T>, KeyError>
    where
        T: 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.try_get_async(label, || async move { Ok::<T, Infallible>(factory().await) })
            .await
            .map_err(|error| match error {
                TryGetError::Key(key_error) => key_error,
                TryGetError::Factory(never) => match never {},
            })
    }

    /// Fallible asynchronous form of [`get`](Self::get).
    ///
    /// A rejected factory future propagates its error unchanged and stores
    /// nothing.
    ///
    /// # Errors
    ///
    /// [`TryGetError::Key`] for an empty label, [`TryGetError::Factory`] for
    /// a rejected factory future.
    pub async fn try_get_async<T, E, F, Fut>(
        &self,
        label: &str,
        factory: F,
    ) -> Result<Rc<T>, TryGetError<E>>
    where
        T: 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = Key::of::<T>(label)?;
        if let Some(existing) = self.content.borrow().get(&key) {
            self.metrics.borrow_mut().record_hit();
            return Ok(downcast_stored(&key, Rc::clone(existing)));
        }

        self.metrics.borrow_mut().record_miss();
        let value = match factory().await {
            Ok(value) => Rc::new(value),
            Err(error) => {
                self.metrics.borrow_mut().record_failure();
                return Err(TryGetError::Factory(error));
            }
        };
        let erased: Rc<dyn Any> = value.clone();
        self.content.borrow_mut().insert(key, erased);
        Ok(value)
    }
}

impl Default for SimpleBag {
    fn default() -> Self {
        Self::new()
    }
}

impl BagMetrics for SimpleBag {
    fn metrics(&self) -> alloc::collections::BTreeMap<alloc::string::String, f64> {
        self.metrics.borrow().to_btreemap()
    }

    fn bag_kind(&self) -> &'static str {
        "SimpleBag"
    }
}

impl core::fmt::Debug for SimpleBag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimpleBag").field("len", &self.len()).finish()
    }
}

/// Recovers the typed value behind a stored entry.
///
/// The key's type component is what was used to store the value, so a
/// mismatch cannot be produced through the public API.
fn downcast_stored<T: 'static>(key: &Key, stored: Rc<dyn Any>) -> Rc<T> {
    match stored.downcast::<T>() {
        Ok(value) => value,
        Err(_) => panic!("value cached for {key:?} has a mismatched type"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern crate std;
    use core::cell::Cell;
    use std::string::String;

    #[test]
    fn test_gives_what_factory_gives() {
        let bag = SimpleBag::new();

        let actual = bag.get("x", || 10).unwrap();

        assert_eq!(*actual, 10);
    }

    #[test]
    fn test_returns_same_instance() {
        let bag = SimpleBag::new();

        let first = bag.get("version", || String::from("12.3")).unwrap();
        let second = bag.get("version", || String::from("13.20")).unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(*second, "12.3");
    }

    #[test]
    fn test_calls_factory_once() {
        let bag = SimpleBag::new();
        let calls = Cell::new(0);
        let factory = || {
            calls.set(calls.get() + 1);
            7u8
        };

        bag.get("x", factory).unwrap();
        bag.get("x", factory).unwrap();

        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_distinguishes_by_type() {
        let bag = SimpleBag::new();

        let number = bag.get("value", || 17u32).unwrap();
        let text = bag.get("value", || String::from("Hello")).unwrap();

        assert_eq!(*number, 17);
        assert_eq!(*text, "Hello");
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn test_empty_label_is_rejected() {
        let bag = SimpleBag::new();

        assert_eq!(bag.get("", || 1u8), Err(KeyError::EmptyLabel));
        assert!(bag.is_empty());
    }

    #[test]
    fn test_factory_error_stores_nothing() {
        let bag = SimpleBag::new();
        let calls = Cell::new(0);
        let factory = || {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Err("fail")
            } else {
                Ok(7u8)
            }
        };

        let first = bag.try_get("x", factory);
        assert!(matches!(first, Err(TryGetError::Factory("fail"))));
        assert!(bag.is_empty());

        let second = bag.try_get("x", factory).unwrap();
        assert_eq!(*second, 7);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_reentrant_factory() {
        let bag = SimpleBag::new();

        let outer = bag
            .get("outer", || *bag.get("inner", || 2u32).unwrap() * 10)
            .unwrap();

        assert_eq!(*outer, 20);
        assert_eq!(bag.len(), 2);
    }
}
