// SPDX-License-Identifier: MIT

use std::sync::{Mutex, MutexGuard, PoisonError};

/// A scoped mutex-guarded cell.
///
/// Wraps a value with a mutex and exposes it through whole-value
/// [`load`](Self::load)/[`store`](Self::store) and scoped
/// [`read`](Self::read)/[`write`](Self::write) closures, so the lock can
/// never be held by accident beyond the access itself.
///
/// ```
/// use superflow::utils::Mutexed;
///
/// let cell = Mutexed::new(String::from("hello"));
/// cell.store(String::from("bye"));
/// let len = cell.read(|s| s.len());
/// assert_eq!(len, 3);
/// ```
pub struct Mutexed<T> {
    inner: Mutex<T>,
}

impl<T> Mutexed<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Replace the value.
    pub fn store(&self, value: T) {
        *self.lock() = value;
    }

    /// Copy the value out.
    pub fn load(&self) -> T
    where
        T: Clone,
    {
        self.lock().clone()
    }

    /// Run `reader` with shared access to the value.
    pub fn read<R>(&self, reader: impl FnOnce(&T) -> R) -> R {
        reader(&self.lock())
    }

    /// Run `writer` with exclusive access to the value.
    pub fn write<R>(&self, writer: impl FnOnce(&mut T) -> R) -> R {
        writer(&mut self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Default> Default for Mutexed<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
