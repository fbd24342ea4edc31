// SPDX-License-Identifier: MIT

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The reader-preferring sibling of [`Mutexed`](super::Mutexed): multiple
/// concurrent [`load`](Self::load)/[`read`](Self::read) calls are allowed,
/// writes are exclusive.
///
/// Better suited where reads are frequent and expensive; holding a lock for
/// expensive work is usually a sign a different design would serve better.
pub struct SharedMutexed<T> {
    inner: RwLock<T>,
}

impl<T> SharedMutexed<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
        }
    }

    /// Replace the value.
    pub fn store(&self, value: T) {
        *self.lock_write() = value;
    }

    /// Copy the value out. Concurrent loads proceed in parallel.
    pub fn load(&self) -> T
    where
        T: Clone,
    {
        self.lock_read().clone()
    }

    /// Run `reader` with shared access; concurrent readers proceed in
    /// parallel.
    pub fn read<R>(&self, reader: impl FnOnce(&T) -> R) -> R {
        reader(&self.lock_read())
    }

    /// Run `writer` with exclusive access.
    pub fn write<R>(&self, writer: impl FnOnce(&mut T) -> R) -> R {
        writer(&mut self.lock_write())
    }

    fn lock_read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Default> Default for SharedMutexed<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_and_load_round_trip() {
        let cell = SharedMutexed::new(String::from("hello"));
        cell.store(String::from("bye"));
        assert_eq!(cell.load(), "bye");
    }

    #[test]
    fn write_then_read() {
        let cell = SharedMutexed::new(7);
        cell.write(|value| *value *= 6);
        assert_eq!(cell.read(|value| *value), 42);
    }
}
