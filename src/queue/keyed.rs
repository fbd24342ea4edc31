// SPDX-License-Identifier: MIT

use std::collections::{BTreeMap, VecDeque};
use std::pin::pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::errors::QueueError;

use super::OverflowPolicy;

type Lanes<K, T> = BTreeMap<K, VecDeque<T>>;

/// A map from producer identity to its own bounded FIFO lane, with aggregate
/// operations over the heads of all lanes.
///
/// Every lane shares the same capacity and overflow policy. Aggregate
/// operations return a snapshot keyed by lane:
///
/// | operation      | blocks until            | returns                  | removes |
/// |----------------|-------------------------|--------------------------|---------|
/// | `peek_ready`   | never                   | heads of non-empty lanes | no      |
/// | `peek_atleast` | some lane is non-empty  | heads of non-empty lanes | no      |
/// | `peek_all`     | every lane is non-empty | heads of every lane      | no      |
/// | `pop_ready`    | never                   | as `peek_ready`          | yes     |
/// | `pop_atleast`  | some lane is non-empty  | as `peek_atleast`        | yes     |
/// | `pop_all`      | every lane is non-empty | as `peek_all`            | yes     |
///
/// With zero lanes, `has_all` is true and the `*_all` operations return an
/// empty snapshot immediately, while the `*_atleast` operations wait until
/// the queue is terminated. Snapshots are ordered by key, so aggregate
/// results are deterministic for a given set of producers.
pub struct KeyedMultiQueue<K, T> {
    lanes: Mutex<Lanes<K, T>>,
    capacity: usize,
    policy: OverflowPolicy,
    arrivals: Notify,
    vacancies: Notify,
    termination: CancellationToken,
}

impl<K, T> KeyedMultiQueue<K, T>
where
    K: Ord + Clone,
{
    /// Create a queue with no lanes. Lanes appear on first `push` for an
    /// unknown key, or via [`add_key`](Self::add_key).
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Result<Self, QueueError> {
        Self::with_keys(capacity, policy, [])
    }

    /// Create a queue with an empty lane for each entry in `keys`.
    pub fn with_keys(
        capacity: usize,
        policy: OverflowPolicy,
        keys: impl IntoIterator<Item = K>,
    ) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }

        let lanes = keys.into_iter().map(|key| (key, VecDeque::new())).collect();

        Ok(Self {
            lanes: Mutex::new(lanes),
            capacity,
            policy,
            arrivals: Notify::new(),
            vacancies: Notify::new(),
            termination: CancellationToken::new(),
        })
    }

    /// Append an element to the lane for `key`, honouring the overflow
    /// policy. The lane is created if it does not exist yet.
    pub async fn push(&self, key: K, item: T) -> Result<(), QueueError> {
        match self.policy {
            OverflowPolicy::Leaky => self.push_leaky(key, item),
            OverflowPolicy::PushBlocking => self.push_blocking(key, item).await,
        }
    }

    fn push_leaky(&self, key: K, item: T) -> Result<(), QueueError> {
        {
            let mut lanes = self.lock_lanes();

            if self.termination.is_cancelled() {
                return Err(QueueError::Terminated);
            }

            let lane = lanes.entry(key).or_default();

            if lane.len() >= self.capacity {
                lane.pop_front();
            }

            lane.push_back(item);
        }

        self.arrivals.notify_waiters();
        Ok(())
    }

    async fn push_blocking(&self, key: K, item: T) -> Result<(), QueueError> {
        let mut slot = Some(item);

        loop {
            let mut vacancy = pin!(self.vacancies.notified());

            {
                let mut lanes = self.lock_lanes();

                if self.termination.is_cancelled() {
                    return Err(QueueError::Terminated);
                }

                let lane = lanes.entry(key.clone()).or_default();

                if lane.len() < self.capacity {
                    if let Some(item) = slot.take() {
                        lane.push_back(item);
                    }
                    drop(lanes);
                    self.arrivals.notify_waiters();
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

    /// Snapshot the head of every non-empty lane without removing anything.
    /// Never blocks; empty when all lanes are empty.
    pub fn peek_ready(&self) -> Result<BTreeMap<K, T>, QueueError>
    where
        T: Clone,
    {
        let lanes = self.lock_lanes();

        if self.termination.is_cancelled() {
            return Err(QueueError::Terminated);
        }

        Ok(Self::copy_heads(&lanes))
    }

    /// As [`peek_ready`](Self::peek_ready), but waits until at least one
    /// lane holds an element.
    pub async fn peek_atleast(&self) -> Result<BTreeMap<K, T>, QueueError>
    where
        T: Clone,
    {
        self.wait_and_collect(Self::any_ready, |lanes| Self::copy_heads(lanes))
            .await
    }

    /// Snapshot the head of every lane, waiting until all lanes hold an
    /// element. With zero lanes, returns an empty snapshot immediately.
    pub async fn peek_all(&self) -> Result<BTreeMap<K, T>, QueueError>
    where
        T: Clone,
    {
        self.wait_and_collect(Self::all_ready, |lanes| Self::copy_heads(lanes))
            .await
    }

    /// Remove and return the head of every non-empty lane. Never blocks.
    pub fn pop_ready(&self) -> Result<BTreeMap<K, T>, QueueError> {
        let taken = {
            let mut lanes = self.lock_lanes();

            if self.termination.is_cancelled() {
                return Err(QueueError::Terminated);
            }

            Self::take_heads(&mut lanes)
        };

        self.vacancies.notify_waiters();
        Ok(taken)
    }

    /// As [`pop_ready`](Self::pop_ready), but waits until at least one lane
    /// holds an element.
    pub async fn pop_atleast(&self) -> Result<BTreeMap<K, T>, QueueError> {
        let taken = self
            .wait_and_collect(Self::any_ready, |lanes| Self::take_heads(lanes))
            .await?;
        self.vacancies.notify_waiters();
        Ok(taken)
    }

    /// Remove and return the head of every lane, waiting until all lanes
    /// hold an element.
    pub async fn pop_all(&self) -> Result<BTreeMap<K, T>, QueueError> {
        let taken = self
            .wait_and_collect(Self::all_ready, |lanes| Self::take_heads(lanes))
            .await?;
        self.vacancies.notify_waiters();
        Ok(taken)
    }

    /// Add an empty lane for `key`. Does nothing if the lane exists.
    pub fn add_key(&self, key: K) {
        self.lock_lanes().entry(key).or_default();
    }

    /// Remove the lane for `key` and drop its contents. Does nothing if no
    /// such lane exists.
    pub fn remove_key(&self, key: &K) {
        self.lock_lanes().remove(key);
        // Removing a lane can satisfy an all-lanes waiter.
        self.arrivals.notify_waiters();
        self.vacancies.notify_waiters();
    }

    pub fn remove_all_keys(&self) {
        self.lock_lanes().clear();
        self.arrivals.notify_waiters();
        self.vacancies.notify_waiters();
    }

    /// Drop the contents of every lane, keeping the lanes themselves.
    pub fn clear(&self) {
        for lane in self.lock_lanes().values_mut() {
            lane.clear();
        }
        self.vacancies.notify_waiters();
    }

    /// True if at least one lane holds an element. False with zero lanes.
    pub fn has_any(&self) -> bool {
        Self::any_ready(&self.lock_lanes())
    }

    /// True if every lane holds an element. True with zero lanes.
    pub fn has_all(&self) -> bool {
        Self::all_ready(&self.lock_lanes())
    }

    pub fn num_keys(&self) -> usize {
        self.lock_lanes().len()
    }

    /// Number of elements queued in the lane for `key`, or zero if absent.
    pub fn len_of(&self, key: &K) -> usize {
        self.lock_lanes().get(key).map_or(0, VecDeque::len)
    }

    /// Terminate the queue, waking all waiters. Idempotent.
    pub fn terminate(&self) {
        self.termination.cancel();
    }

    pub fn is_terminated(&self) -> bool {
        self.termination.is_cancelled()
    }

    async fn wait_and_collect<O>(
        &self,
        ready: impl Fn(&Lanes<K, T>) -> bool,
        collect: impl Fn(&mut Lanes<K, T>) -> O,
    ) -> Result<O, QueueError> {
        loop {
            let mut arrival = pin!(self.arrivals.notified());

            {
                let mut lanes = self.lock_lanes();

                if self.termination.is_cancelled() {
                    return Err(QueueError::Terminated);
                }

                if ready(&lanes) {
                    return Ok(collect(&mut lanes));
                }

                arrival.as_mut().enable();
            }

            tokio::select! {
                _ = &mut arrival => {}
                _ = self.termination.cancelled() => {}
            }
        }
    }

    fn any_ready(lanes: &Lanes<K, T>) -> bool {
        lanes.values().any(|lane| !lane.is_empty())
    }

    fn all_ready(lanes: &Lanes<K, T>) -> bool {
        lanes.values().all(|lane| !lane.is_empty())
    }

    fn copy_heads(lanes: &Lanes<K, T>) -> BTreeMap<K, T>
    where
        T: Clone,
    {
        lanes
            .iter()
            .filter_map(|(key, lane)| lane.front().map(|item| (key.clone(), item.clone())))
            .collect()
    }

    fn take_heads(lanes: &mut Lanes<K, T>) -> BTreeMap<K, T> {
        lanes
            .iter_mut()
            .filter_map(|(key, lane)| lane.pop_front().map(|item| (key.clone(), item)))
            .collect()
    }

    fn lock_lanes(&self) -> MutexGuard<'_, Lanes<K, T>> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
