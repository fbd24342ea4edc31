// SPDX-License-Identifier: MIT

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::errors::QueueError;

/// What a full queue does with an incoming element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Drop the oldest element to make room. Producers never wait.
    #[default]
    Leaky,
    /// Suspend the producer until a consumer frees a slot.
    PushBlocking,
}

/// A bounded FIFO protecting its contents with a mutex and waking consumers
/// and producers through notifiers.
///
/// `pop` suspends until an element arrives; with
/// [`OverflowPolicy::PushBlocking`] a `push` on a full queue suspends until a
/// slot frees up. [`terminate`](Self::terminate) wakes every waiter and
/// freezes the queue: all subsequent pushes, pops and peeks fail with
/// [`QueueError::Terminated`].
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    policy: OverflowPolicy,
    consumers: Notify,
    producers: Notify,
    termination: CancellationToken,
}

impl<T> BoundedQueue<T> {
    /// Create an empty queue holding at most `capacity` elements.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Result<Self, QueueError> {
        Self::with_items(capacity, policy, [])
    }

    /// Create a queue pre-filled with `seed`, which must fit the capacity.
    pub fn with_items(
        capacity: usize,
        policy: OverflowPolicy,
        seed: impl IntoIterator<Item = T>,
    ) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }

        let items: VecDeque<T> = seed.into_iter().collect();

        if items.len() > capacity {
            return Err(QueueError::SeedOverflow {
                len: items.len(),
                capacity,
            });
        }

        Ok(Self {
            items: Mutex::new(items),
            capacity,
            policy,
            consumers: Notify::new(),
            producers: Notify::new(),
            termination: CancellationToken::new(),
        })
    }

    /// Append an element, honouring the overflow policy.
    pub async fn push(&self, item: T) -> Result<(), QueueError> {
        match self.policy {
            OverflowPolicy::Leaky => self.push_leaky(item),
            OverflowPolicy::PushBlocking => self.push_blocking(item).await,
        }
    }

    fn push_leaky(&self, item: T) -> Result<(), QueueError> {
        {
            let mut items = self.lock_items();

            if self.termination.is_cancelled() {
                return Err(QueueError::Terminated);
            }

            if items.len() >= self.capacity {
                items.pop_front();
            }

            items.push_back(item);
        }

        self.consumers.notify_waiters();
        // Leaky frees no slot; waking producers keeps leak-probe logic simple.
        self.producers.notify_waiters();
        Ok(())
    }

    async fn push_blocking(&self, item: T) -> Result<(), QueueError> {
        let mut slot = Some(item);

        loop {
            let mut vacancy = pin!(self.producers.notified());

            {
                let mut items = self.lock_items();

                if self.termination.is_cancelled() {
                    return Err(QueueError::Terminated);
                }

                if items.len() < self.capacity {
                    if let Some(item) = slot.take() {
                        items.push_back(item);
                    }
                    drop(items);
                    self.consumers.notify_waiters();
                    return Ok(());
                }

                vacancy.as_mut().enable();
            }

            tokio::select! {
                _ = &mut vacancy => {}
                _ = self.termination.cancelled() => {}
            }
        }
    }

    /// Remove and return the oldest element, waiting for one to arrive.
    pub async fn pop(&self) -> Result<T, QueueError> {
        loop {
            let mut arrival = pin!(self.consumers.notified());

            {
                let mut items = self.lock_items();

                if self.termination.is_cancelled() {
                    return Err(QueueError::Terminated);
                }

                if let Some(item) = items.pop_front() {
                    drop(items);
                    self.producers.notify_waiters();
                    return Ok(item);
                }

                arrival.as_mut().enable();
            }

            tokio::select! {
                _ = &mut arrival => {}
                _ = self.termination.cancelled() => {}
            }
        }
    }

    /// Return a copy of the oldest element without removing it, waiting for
    /// one to arrive.
    pub async fn front(&self) -> Result<T, QueueError>
    where
        T: Clone,
    {
        loop {
            let mut arrival = pin!(self.consumers.notified());

            {
                let items = self.lock_items();

                if self.termination.is_cancelled() {
                    return Err(QueueError::Terminated);
                }

                if let Some(item) = items.front() {
                    return Ok(item.clone());
                }

                arrival.as_mut().enable();
            }

            tokio::select! {
                _ = &mut arrival => {}
                _ = self.termination.cancelled() => {}
            }
        }
    }

    /// Number of elements currently queued.
    pub fn len(&self) -> usize {
        self.lock_items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_items().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Drop all queued elements without terminating the queue.
    pub fn clear(&self) {
        self.lock_items().clear();
        self.producers.notify_waiters();
    }

    /// Terminate the queue, waking all waiters. Idempotent.
    pub fn terminate(&self) {
        self.termination.cancel();
    }

    pub fn is_terminated(&self) -> bool {
        self.termination.is_cancelled()
    }

    fn lock_items(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
