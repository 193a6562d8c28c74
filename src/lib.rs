#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! # Code Reference
//!
//! This section provides quick code examples and API references for both
//! bag variants.
//!
//! ## Variant Selection Guide
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                    Which Bag Should I Use?                         │
//! ├────────────────────────────────────────────────────────────────────┤
//! │                                                                    │
//! │  Is the bag ever touched from more than one thread or task?        │
//! │                                                                    │
//! │          No                              Yes                       │
//! │           │                               │                        │
//! │           ▼                               ▼                        │
//! │     ┌───────────┐                 ┌───────────────┐                │
//! │     │ SimpleBag │                 │ ConcurrentBag │                │
//! │     └───────────┘                 └───────────────┘                │
//! │   plain map, zero overhead,     at-most-once factory execution,    │
//! │   !Send + !Sync by design       failure eviction, shared futures   │
//! │                                                                    │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Reference
//!
//! | Type | Description | Returns |
//! |------|-------------|---------|
//! | [`SimpleBag`] | Single-threaded lazy-singleton map | `Rc<T>` |
//! | [`ConcurrentBag`] | Thread-safe, compute-once lazy-singleton map | `Arc<T>` |
//!
//! | Operation | Factory | Failure surface |
//! |-----------|---------|-----------------|
//! | `get` | `FnOnce() -> T` | [`KeyError`] only |
//! | `try_get` | `FnOnce() -> Result<T, E>` | [`TryGetError`] |
//! | `get_async` | `FnOnce() -> impl Future<Output = T>` | [`KeyError`] only |
//! | `try_get_async` | `FnOnce() -> impl Future<Output = Result<T, E>>` | [`TryGetError`] |
//!
//! ## SimpleBag
//!
//! ```rust
//! use singleton_bag::SimpleBag;
//!
//! let bag = SimpleBag::new();
//!
//! // The first call runs the factory; later calls return the cached
//! // instance and never look at their factory argument again.
//! let parsed = bag.get("parsed_config", || vec![1u8, 2, 3]).unwrap();
//! let again = bag.get("parsed_config", || unreachable!()).unwrap();
//! assert!(std::rc::Rc::ptr_eq(&parsed, &again));
//! ```
//!
//! ## ConcurrentBag
//!
//! Enable the `concurrent` feature:
//!
//! ```toml
//! [dependencies]
//! singleton-bag = { version = "0.2", features = ["concurrent"] }
//! ```
//!
//! ```rust,ignore
//! use singleton_bag::ConcurrentBag;
//! use std::sync::Arc;
//!
//! let bag = Arc::new(ConcurrentBag::new());
//!
//! // Safe to share across threads; racing callers on one key share a
//! // single factory invocation.
//! let pool = bag.get("worker_pool", || build_pool()).unwrap();
//!
//! // Asynchronous factories are memoized as shared in-flight operations.
//! let schema = bag
//!     .try_get_async("schema", || async { load_schema().await })
//!     .await?;
//! ```
//!
//! ## Modules
//!
//! - [`key`]: the `(label, value type)` identity entries are addressed by
//! - [`simple`]: single-threaded bag implementation
//! - [`concurrent`]: thread-safe bag implementation (requires the
//!   `concurrent` feature)
//! - [`error`]: key validation and factory passthrough error types
//! - [`metrics`]: hit/miss/failure accounting for both bag kinds

#![no_std]

/// Key identity type.
///
/// Provides the [`Key`] struct combining a non-empty call-site label with a
/// `TypeId`, which is what lets one bag hold values of many types without
/// collisions.
pub mod key;

/// Error types.
///
/// Provides [`KeyError`] for label validation and [`TryGetError`] for the
/// fallible bag operations. Factory errors pass through these types
/// untouched.
pub mod error;

/// Single-threaded singleton bag.
///
/// Provides [`SimpleBag`], a plain map from key to materialized value with
/// no concurrency protocol. Its `!Send + !Sync` types make single-threaded
/// use a compile-time guarantee.
pub mod simple;

/// Bag metrics system.
///
/// Provides hit/miss/failure counters in plain and atomic flavors and the
/// [`BagMetrics`] reporting trait implemented by both bag kinds.
pub mod metrics;

/// Concurrency-safe singleton bag.
///
/// Provides [`ConcurrentBag`], which guarantees at-most-once factory
/// execution per key under arbitrary concurrent access (for synchronous and
/// asynchronous factories alike) and evicts failed attempts so a later call
/// can retry.
///
/// Available when the `concurrent` feature is enabled.
#[cfg(feature = "concurrent")]
pub mod concurrent;

// Re-export the bag types
pub use key::Key;
pub use simple::SimpleBag;

#[cfg(feature = "concurrent")]
pub use concurrent::ConcurrentBag;

// Re-export error types
pub use error::{KeyError, TryGetError};

// Re-export metrics types
pub use metrics::{BagMetrics, CoreBagMetrics, SharedBagMetrics};
