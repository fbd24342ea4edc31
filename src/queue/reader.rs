// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::errors::PortError;

use super::{BoundedQueue, KeyedMultiQueue};

/// Pull strategy used by consumer ports when reading their buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Wait for the next element; every element is seen exactly once.
    #[default]
    Blocking,
    /// Return the most recently seen element when nothing new is pending;
    /// otherwise consume one pending element first. With buffer capacity 1
    /// this always yields the newest available value.
    Latched,
    /// Multi-source only: return whatever sources have ready, possibly
    /// nothing, without waiting.
    ReadyOnly,
    /// Multi-source only: like `Latched`, but wait until at least one
    /// source has produced something new.
    AtLeastOneNew,
}

/// Pull adapter over a [`BoundedQueue`], parameterised by [`ReadMode`].
///
/// Only [`ReadMode::Blocking`] and [`ReadMode::Latched`] apply to a single
/// queue; the other modes are rejected at construction.
pub struct QueueReader<T> {
    mode: ReadMode,
    latched: Mutex<Option<T>>,
}

impl<T: Clone> QueueReader<T> {
    pub fn new(mode: ReadMode) -> Result<Self, PortError> {
        match mode {
            ReadMode::Blocking | ReadMode::Latched => Ok(Self {
                mode,
                latched: Mutex::new(None),
            }),
            ReadMode::ReadyOnly | ReadMode::AtLeastOneNew => {
                Err(PortError::UnsupportedReadMode { mode })
            }
        }
    }

    /// Fetch the next element according to the read mode. `None` means the
    /// queue has been terminated: end of stream.
    pub async fn get(&self, queue: &BoundedQueue<T>) -> Option<T> {
        match self.mode {
            ReadMode::Blocking => queue.pop().await.ok(),
            ReadMode::Latched => {
                if self.cache().is_none() || !queue.is_empty() {
                    match queue.pop().await {
                        Ok(item) => *self.cache() = Some(item),
                        Err(_) => return None,
                    }
                }
                self.cache().clone()
            }
            ReadMode::ReadyOnly | ReadMode::AtLeastOneNew => None,
        }
    }

    /// True if a subsequent [`get`](Self::get) would succeed without waiting.
    pub fn has_next(&self, queue: &BoundedQueue<T>) -> bool {
        match self.mode {
            ReadMode::Blocking => !queue.is_empty(),
            ReadMode::Latched => self.cache().is_some() || !queue.is_empty(),
            ReadMode::ReadyOnly | ReadMode::AtLeastOneNew => false,
        }
    }

    /// Drop the latched cache, if any.
    pub fn clear(&self) {
        *self.cache() = None;
    }

    fn cache(&self) -> MutexGuard<'_, Option<T>> {
        self.latched.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Pull adapter over a [`KeyedMultiQueue`], parameterised by [`ReadMode`].
///
/// Snapshots are returned as vectors in ascending key order, so results are
/// deterministic for a fixed set of sources.
pub struct KeyedQueueReader<K, T> {
    mode: ReadMode,
    latched: Mutex<BTreeMap<K, T>>,
}

impl<K, T> KeyedQueueReader<K, T>
where
    K: Ord + Clone,
    T: Clone,
{
    pub fn new(mode: ReadMode) -> Self {
        Self {
            mode,
            latched: Mutex::new(BTreeMap::new()),
        }
    }

    /// Fetch the next aggregate snapshot according to the read mode. `None`
    /// means the queue has been terminated: end of stream.
    pub async fn get(&self, queue: &KeyedMultiQueue<K, T>) -> Option<Vec<T>> {
        match self.mode {
            ReadMode::Blocking => queue.pop_all().await.ok().map(Self::values),
            ReadMode::ReadyOnly => queue.pop_ready().ok().map(Self::values),
            ReadMode::Latched => {
                if self.cache().is_empty() {
                    let fresh = queue.pop_all().await.ok()?;
                    *self.cache() = fresh;
                } else {
                    let fresh = queue.pop_ready().ok()?;
                    self.cache().extend(fresh);
                }
                Some(Self::values(self.cache().clone()))
            }
            ReadMode::AtLeastOneNew => {
                let fresh = if self.cache().is_empty() {
                    queue.pop_all().await.ok()?
                } else {
                    queue.pop_atleast().await.ok()?
                };
                self.cache().extend(fresh);
                Some(Self::values(self.cache().clone()))
            }
        }
    }

    /// True if a subsequent [`get`](Self::get) would succeed without waiting.
    pub fn has_next(&self, queue: &KeyedMultiQueue<K, T>) -> bool {
        match self.mode {
            ReadMode::Blocking => queue.has_all(),
            ReadMode::ReadyOnly => true,
            ReadMode::Latched => !self.cache().is_empty() || queue.has_all(),
            ReadMode::AtLeastOneNew => {
                if self.cache().is_empty() {
                    queue.has_all()
                } else {
                    queue.has_any()
                }
            }
        }
    }

    /// Drop the per-source cache.
    pub fn clear(&self) {
        self.cache().clear();
    }

    fn values(snapshot: BTreeMap<K, T>) -> Vec<T> {
        snapshot.into_values().collect()
    }

    fn cache(&self) -> MutexGuard<'_, BTreeMap<K, T>> {
        self.latched.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
