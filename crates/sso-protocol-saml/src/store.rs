//! Swappable read-mostly configuration.
//!
//! Readers take an `Arc` snapshot and keep using it for the whole exchange,
//! so a concurrent reload never shows them a half-updated key pair.

use std::sync::Arc;

use parking_lot::RwLock;

/// Holds an immutable value that can be replaced as a whole.
#[derive(Debug)]
pub struct ConfigCell<T> {
    inner: RwLock<Arc<T>>,
}

impl<T> ConfigCell<T> {
    /// Creates a cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(Arc::new(value)),
        }
    }

    /// Returns a snapshot of the current value.
    #[inline]
    pub fn load(&self) -> Arc<T> {
        self.inner.read().clone()
    }

    /// Replaces the value and returns the previous one.
    pub fn replace(&self, value: T) -> Arc<T> {
        std::mem::replace(&mut *self.inner.write(), Arc::new(value))
    }
}

impl<T: Default> Default for ConfigCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
