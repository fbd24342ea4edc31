// SPDX-License-Identifier: MIT

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::Stream;

use crate::errors::PortError;
use crate::queue::{KeyedMultiQueue, KeyedQueueReader, OverflowPolicy, ReadMode};
use crate::traits::{ErasedEndpoint, Port, PortId, PortRef, PortStatus, ValueReceiver};

use super::registry::{ConnectPolicy, ConnectionRegistry};
use super::{variant_endpoint, InputVariant};

/// An input port keeping one buffer per connected producer.
///
/// Each producer gets its own bounded lane keyed by its port identity;
/// [`get_next`](Self::get_next) returns an aggregate snapshot whose size
/// depends on the configured [`ReadMode`]. Snapshot entries are ordered by
/// source identity, so the layout is stable for a fixed set of producers.
pub struct MultiConsumerPort<T> {
    myself: Weak<MultiConsumerPort<T>>,
    lanes: KeyedMultiQueue<PortId, T>,
    reader: KeyedQueueReader<PortId, T>,
    registry: ConnectionRegistry,
    variants: Vec<InputVariant<T>>,
    transactions: AtomicUsize,
}

impl<T: Clone + Send + Sync + 'static> MultiConsumerPort<T> {
    /// Create a port whose per-producer buffers hold `capacity` elements.
    pub fn new(capacity: usize, mode: ReadMode) -> Result<Arc<Self>, PortError> {
        Self::with_variants(capacity, mode, Vec::new())
    }

    /// As [`new`](Self::new), additionally accepting producers of the given
    /// variant types.
    pub fn with_variants(
        capacity: usize,
        mode: ReadMode,
        variants: Vec<InputVariant<T>>,
    ) -> Result<Arc<Self>, PortError> {
        let lanes = KeyedMultiQueue::new(capacity, OverflowPolicy::Leaky)?;

        Ok(Arc::new_cyclic(|myself| Self {
            myself: myself.clone(),
            lanes,
            reader: KeyedQueueReader::new(mode),
            registry: ConnectionRegistry::new(ConnectPolicy::Multi),
            variants,
            transactions: AtomicUsize::new(0),
        }))
    }

    /// Pull the next aggregate snapshot, ordered by source identity. `None`
    /// marks the end of the stream: the port has been deactivated.
    pub async fn get_next(&self) -> Option<Vec<T>> {
        let items = self.reader.get(&self.lanes).await;

        if items.is_some() {
            self.transactions.fetch_add(1, Ordering::Relaxed);
        }

        items
    }

    /// True if a `get_next` would succeed without waiting.
    pub fn has_next(&self) -> bool {
        self.reader.has_next(&self.lanes)
    }

    /// The port as a lazy stream of snapshots, finite once deactivated.
    pub fn stream(self: &Arc<Self>) -> impl Stream<Item = Vec<T>> {
        futures::stream::unfold(self.clone(), |port| async move {
            port.get_next().await.map(|items| (items, port))
        })
    }

    /// False once the port has been deactivated.
    pub fn is_active(&self) -> bool {
        !self.lanes.is_terminated()
    }

    /// Drop all buffered data, keeping connections and the reader cache.
    pub fn clear(&self) {
        self.lanes.clear();
    }

    /// Terminate every lane, waking any blocked reader with end-of-stream.
    pub fn deactivate(&self) {
        self.lanes.terminate();
    }

    fn owner(&self) -> Option<PortRef> {
        let me: PortRef = self.myself.upgrade()?;
        Some(me)
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> ValueReceiver<T> for MultiConsumerPort<T> {
    async fn receive(&self, value: T, source: PortId) {
        // Dropped silently when the port is deactivated.
        let _ = self.lanes.push(source, value).await;
    }
}

impl<T: Clone + Send + Sync + 'static> Port for MultiConsumerPort<T> {
    fn connect(&self, peer: &PortRef) -> Result<(), PortError> {
        let owner = self.owner().ok_or(PortError::NotConnected)?;
        self.registry.connect(&owner, peer)?;
        self.lanes.add_key(PortId::of(peer));
        Ok(())
    }

    fn disconnect_all(&self) {
        let Some(owner) = self.owner() else { return };
        self.registry.disconnect_all(&owner);
        self.lanes.remove_all_keys();
    }

    fn disconnect_peer(&self, peer: &PortRef) {
        let Some(owner) = self.owner() else { return };
        self.registry.disconnect_peer(&owner, peer);
        self.lanes.remove_key(&PortId::of(peer));
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
        MultiConsumerPort::deactivate(self);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ProducerPort;
    use crate::traits::port_ref;

    #[tokio::test]
    async fn each_producer_gets_its_own_lane() {
        let consumer = MultiConsumerPort::<i32>::new(2, ReadMode::Blocking).unwrap();
        let a = ProducerPort::<i32>::new();
        let b = ProducerPort::<i32>::new();

        a.connect(&port_ref(&consumer)).unwrap();
        b.connect(&port_ref(&consumer)).unwrap();

        a.send(1).await;
        b.send(2).await;

        let snapshot = consumer.get_next().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(&1));
        assert!(snapshot.contains(&2));
    }

    #[tokio::test]
    async fn latched_snapshot_with_many_producers_stays_full() {
        let consumer = MultiConsumerPort::<i32>::new(1, ReadMode::Latched).unwrap();

        let producers: Vec<_> = (0..10).map(|_| ProducerPort::<i32>::new()).collect();
        for producer in &producers {
            producer.connect(&port_ref(&consumer)).unwrap();
        }
        for producer in &producers {
            producer.send(42).await;
        }

        for _ in 0..10 {
            let snapshot = consumer.get_next().await.unwrap();
            assert_eq!(snapshot, vec![42; 10]);
        }
    }

    #[tokio::test]
    async fn disconnecting_a_producer_drops_its_lane() {
        let consumer = MultiConsumerPort::<i32>::new(2, ReadMode::ReadyOnly).unwrap();
        let a = ProducerPort::<i32>::new();
        let b = ProducerPort::<i32>::new();

        a.connect(&port_ref(&consumer)).unwrap();
        b.connect(&port_ref(&consumer)).unwrap();
        a.send(1).await;
        b.send(2).await;

        consumer.disconnect_peer(&port_ref(&a));
        assert!(!a.is_connected());

        let snapshot = consumer.get_next().await.unwrap();
        assert_eq!(snapshot, vec![2]);
    }

    #[tokio::test]
    async fn deactivate_ends_the_stream() {
        let consumer = MultiConsumerPort::<i32>::new(1, ReadMode::Blocking).unwrap();
        let producer = ProducerPort::<i32>::new();
        producer.connect(&port_ref(&consumer)).unwrap();

        consumer.deactivate();
        assert!(!consumer.is_active());
        assert_eq!(consumer.get_next().await, None);
    }
}
