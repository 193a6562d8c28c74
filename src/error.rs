//! Bag Error Types
//!
//! Two kinds of failure can surface from a bag, and they are kept strictly
//! apart:
//!
//! - [`KeyError`] — the caller handed the bag an unusable key (an empty
//!   label). This is a contract violation on the calling side and is raised
//!   synchronously on both the synchronous and asynchronous paths, before
//!   any lookup or factory invocation happens.
//! - [`TryGetError::Factory`] — the supplied factory failed. The error
//!   passes through exactly as the factory produced it; the bag never wraps,
//!   classifies, logs, or recovers from it. The only thing the bag does on a
//!   factory failure is bookkeeping: the failed holder is evicted so that
//!   the next call for the same key gets a fresh attempt.
//!
//! The concurrency-safe bag shares a single failed attempt between every
//! caller waiting on it, so its fallible operations surface the factory
//! error as `TryGetError<Arc<E>>` rather than `TryGetError<E>`: each waiter
//! receives a handle to the same error value.

use thiserror::Error;

/// Error constructing a [`Key`](crate::Key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The label was empty. Labels identify call sites; an empty label would
    /// silently merge every unlabeled caller onto one cache entry.
    #[error("bag keys require a non-empty label")]
    EmptyLabel,
}

/// Error returned by the fallible bag operations (`try_get`,
/// `try_get_async`).
///
/// `E` is whatever error type the factory produces. On the concurrency-safe
/// bag `E` is `Arc<E>`, since one failed attempt is observed by every caller
/// that was waiting on it.
#[derive(Debug, Error)]
pub enum TryGetError<E> {
    /// The label failed validation; no lookup happened and no factory ran.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// The factory failed. The failed holder has been evicted, so a later
    /// call for the same key will invoke its factory again.
    #[error("factory failed: {0}")]
    Factory(E),
}

impl<E> TryGetError<E> {
    /// Returns the factory error, if this is a factory failure.
    pub fn into_factory_error(self) -> Option<E> {
        match self {
            TryGetError::Key(_) => None,
            TryGetError::Factory(error) => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern crate std;
    use std::string::ToString;

    #[test]
    fn test_key_error_display() {
        assert_eq!(
            KeyError::EmptyLabel.to_string(),
            "bag keys require a non-empty label"
        );
    }

    #[test]
    fn test_try_get_error_display() {
        let key: TryGetError<&str> = TryGetError::Key(KeyError::EmptyLabel);
        assert_eq!(key.to_string(), "bag keys require a non-empty label");

        let factory: TryGetError<&str> = TryGetError::Factory("boom");
        assert_eq!(factory.to_string(), "factory failed: boom");
    }

    #[test]
    fn test_key_error_converts() {
        let error: TryGetError<&str> = KeyError::EmptyLabel.into();
        assert!(matches!(error, TryGetError::Key(KeyError::EmptyLabel)));
    }

    #[test]
    fn test_into_factory_error() {
        let factory: TryGetError<u32> = TryGetError::Factory(7);
        assert_eq!(factory.into_factory_error(), Some(7));

        let key: TryGetError<u32> = TryGetError::Key(KeyError::EmptyLabel);
        assert_eq!(key.into_factory_error(), None);
    }
}
