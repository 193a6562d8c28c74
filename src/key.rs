//! Bag Key Identity
//!
//! A [`Key`] addresses one cached entry inside a bag. It combines two pieces
//! of information:
//!
//! - a **label**: a non-empty string naming the call site (or any other
//!   caller-chosen identifier), and
//! - a **value type**: the [`TypeId`] of the value cached under the key.
//!
//! Two keys are interchangeable as map keys exactly when both parts are
//! equal. The type component is what lets one bag hold values of arbitrary
//! types without them colliding: `("config", u32)` and `("config", String)`
//! are unrelated entries.
//!
//! # Construction
//!
//! Keys are immutable once constructed. An empty label is rejected with
//! [`KeyError::EmptyLabel`](crate::error::KeyError::EmptyLabel) because an
//! empty string almost always means a caller forgot to supply the call-site
//! identifier, and silently sharing one entry among all such callers would
//! be a far worse failure mode.
//!
//! # Examples
//!
//! ```
//! use singleton_bag::Key;
//!
//! let a = Key::of::<u32>("connection_pool").unwrap();
//! let b = Key::of::<u32>("connection_pool").unwrap();
//! let c = Key::of::<String>("connection_pool").unwrap();
//!
//! assert_eq!(a, b);
//! assert_ne!(a, c);
//! assert!(Key::of::<u32>("").is_err());
//! ```

extern crate alloc;

use alloc::boxed::Box;
use core::any::TypeId;

use crate::error::KeyError;

/// Identity of one cached entry: a call-site label plus a value type tag.
///
/// Equality and hashing consider both components, so the same label can
/// safely address values of different types in one bag. Keys are cheap to
/// clone and carry no lifecycle beyond value semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    label: Box<str>,
    type_id: TypeId,
}

impl Key {
    /// Creates a key from a label and an explicit type identifier.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::EmptyLabel`] if `label` is empty.
    pub fn new(label: &str, type_id: TypeId) -> Result<Self, KeyError> {
        if label.is_empty() {
            return Err(KeyError::EmptyLabel);
        }
        Ok(Key {
            label: label.into(),
            type_id,
        })
    }

    /// Creates a key whose type component is derived from `T`.
    ///
    /// This is the form the bags use internally: `bag.get::<T>(label, ..)`
    /// addresses the entry `Key::of::<T>(label)`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::EmptyLabel`] if `label` is empty.
    pub fn of<T: 'static>(label: &str) -> Result<Self, KeyError> {
        Self::new(label, TypeId::of::<T>())
    }

    /// The label component of this key.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The value-type component of this key.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }
}
