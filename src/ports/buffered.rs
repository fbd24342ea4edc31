// SPDX-License-Identifier: MIT

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::Stream;

use crate::errors::PortError;
use crate::queue::{BoundedQueue, OverflowPolicy, QueueReader, ReadMode};
use crate::traits::{ErasedEndpoint, Port, PortId, PortRef, PortStatus, ValueReceiver};

use super::registry::{ConnectPolicy, ConnectionRegistry};
use super::{variant_endpoint, InputVariant};

/// Construction parameters for a [`BufferedConsumerPort`].
#[derive(Debug, Clone, Copy)]
pub struct ConsumerOptions {
    /// Number of elements the buffer holds. Defaults to 1.
    pub capacity: usize,
    /// How many producers may connect. Defaults to [`ConnectPolicy::Single`].
    pub connections: ConnectPolicy,
    /// Pull strategy for `get_next`. Defaults to [`ReadMode::Blocking`];
    /// only `Blocking` and `Latched` apply to a single buffer.
    pub mode: ReadMode,
    /// What a full buffer does with new data. Defaults to
    /// [`OverflowPolicy::Leaky`].
    pub overflow: OverflowPolicy,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            capacity: 1,
            connections: ConnectPolicy::Single,
            mode: ReadMode::Blocking,
            overflow: OverflowPolicy::Leaky,
        }
    }
}

/// An input port buffering received data in a bounded queue.
///
/// Received values are enqueued subject to the overflow policy; a reader
/// configured by [`ReadMode`] pulls them back out through
/// [`get_next`](Self::get_next), which returns `None` once the port has been
/// deactivated. A deactivated port silently drops further input.
pub struct BufferedConsumerPort<T> {
    myself: Weak<BufferedConsumerPort<T>>,
    buffer: BoundedQueue<T>,
    reader: QueueReader<T>,
    registry: ConnectionRegistry,
    variants: Vec<InputVariant<T>>,
    transactions: AtomicUsize,
}

impl<T: Clone + Send + Sync + 'static> BufferedConsumerPort<T> {
    /// A single-producer, blocking, leaky port with the given capacity.
    pub fn with_capacity(capacity: usize) -> Result<Arc<Self>, PortError> {
        Self::new(ConsumerOptions {
            capacity,
            ..ConsumerOptions::default()
        })
    }

    pub fn new(options: ConsumerOptions) -> Result<Arc<Self>, PortError> {
        Self::with_variants(options, Vec::new())
    }

    /// As [`new`](Self::new), additionally accepting producers of the given
    /// variant types.
    pub fn with_variants(
        options: ConsumerOptions,
        variants: Vec<InputVariant<T>>,
    ) -> Result<Arc<Self>, PortError> {
        let buffer = BoundedQueue::new(options.capacity, options.overflow)?;
        let reader = QueueReader::new(options.mode)?;

        Ok(Arc::new_cyclic(|myself| Self {
            myself: myself.clone(),
            buffer,
            reader,
            registry: ConnectionRegistry::new(options.connections),
            variants,
            transactions: AtomicUsize::new(0),
        }))
    }

    /// Pull the next value according to the read mode. `None` marks the end
    /// of the stream: the port has been deactivated.
    pub async fn get_next(&self) -> Option<T> {
        let item = self.reader.get(&self.buffer).await;

        if item.is_some() {
            self.transactions.fetch_add(1, Ordering::Relaxed);
        }

        item
    }

    /// True if a `get_next` would succeed without waiting.
    pub fn has_next(&self) -> bool {
        self.reader.has_next(&self.buffer)
    }

    /// The port as a lazy stream of values, finite once deactivated.
    pub fn stream(self: &Arc<Self>) -> impl Stream<Item = T> {
        futures::stream::unfold(self.clone(), |port| async move {
            port.get_next().await.map(|item| (item, port))
        })
    }

    /// False once the port has been deactivated.
    pub fn is_active(&self) -> bool {
        !self.buffer.is_terminated()
    }

    /// Drop buffered data and the reader's latched cache.
    pub fn clear(&self) {
        self.buffer.clear();
        self.reader.clear();
    }

    /// Terminate the buffer, waking any blocked reader with end-of-stream.
    pub fn deactivate(&self) {
        self.buffer.terminate();
    }

    pub fn queue_len(&self) -> usize {
        self.buffer.len()
    }

    fn owner(&self) -> Option<PortRef> {
        let me: PortRef = self.myself.upgrade()?;
        Some(me)
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> ValueReceiver<T> for BufferedConsumerPort<T> {
    async fn receive(&self, value: T, _source: PortId) {
        if !self.buffer.is_terminated() {
            // Dropped silently when the port is deactivated mid-push.
            let _ = self.buffer.push(value).await;
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Port for BufferedConsumerPort<T> {
    fn connect(&self, peer: &PortRef) -> Result<(), PortError> {
        let owner = self.owner().ok_or(PortError::NotConnected)?;
        self.registry.connect(&owner, peer)
    }

    fn disconnect_all(&self) {
        let Some(owner) = self.owner() else { return };
        self.registry.disconnect_all(&owner);
    }

    fn disconnect_peer(&self, peer: &PortRef) {
        let Some(owner) = self.owner() else { return };
        self.registry.disconnect_peer(&owner, peer);
    }

    fn is_connected(&self) -> bool {
        self.registry.is_connected()
    }

    fn status(&self) -> PortStatus {
        PortStatus {
            connections: self.registry.connection_count(),
            transactions: self.transactions.load(Ordering::Relaxed),
        }
    }

    fn id(&self) -> PortId {
        PortId::of_weak(&self.myself)
    }

    fn deactivate(&self) {
        BufferedConsumerPort::deactivate(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn consumer_endpoint(&self, value_type: TypeId) -> Option<ErasedEndpoint> {
        let me = self.myself.upgrade()?;
        let receiver: Arc<dyn ValueReceiver<T>> = me;

        if value_type == TypeId::of::<T>() {
            return Some(ErasedEndpoint::new(receiver));
        }

        variant_endpoint(&self.variants, value_type, receiver)
    }
}
