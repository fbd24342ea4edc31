// SPDX-License-Identifier: MIT

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;

use crate::errors::PortError;
use crate::traits::{ErasedEndpoint, Port, PortId, PortRef, PortStatus, ValueReceiver};

/// Declares that a producer of `T` may also feed consumers of another type
/// `U`, converting each outgoing `T` into a `U`.
pub struct OutputVariant<T> {
    target: TypeId,
    adapt: Arc<dyn Fn(ErasedEndpoint) -> Option<Arc<dyn ValueReceiver<T>>> + Send + Sync>,
}

impl<T: Send + Sync + 'static> OutputVariant<T> {
    /// Feed consumers of type `U`, converting each value with `convert`.
    pub fn converting<U, F>(convert: F) -> Self
    where
        U: Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let convert = Arc::new(convert);

        Self {
            target: TypeId::of::<U>(),
            adapt: Arc::new(move |endpoint| {
                let receiver = endpoint.downcast::<Arc<dyn ValueReceiver<U>>>()?;
                let adapter: Arc<dyn ValueReceiver<T>> = Arc::new(OutputAdapter {
                    receiver,
                    convert: convert.clone(),
                });
                Some(adapter)
            }),
        }
    }

    /// Feed consumers of type `U` through `T`'s `Into<U>` conversion.
    pub fn into_type<U>() -> Self
    where
        T: Clone + Into<U>,
        U: Send + Sync + 'static,
    {
        Self::converting(|value: &T| value.clone().into())
    }
}

struct OutputAdapter<T, U> {
    receiver: Arc<dyn ValueReceiver<U>>,
    convert: Arc<dyn Fn(&T) -> U + Send + Sync>,
}

#[async_trait]
impl<T, U> ValueReceiver<T> for OutputAdapter<T, U>
where
    T: Send + Sync + 'static,
    U: Send + Sync + 'static,
{
    async fn receive(&self, value: T, source: PortId) {
        self.receiver.receive((self.convert)(&value), source).await;
    }
}

struct Connection<T> {
    id: PortId,
    port: Weak<dyn Port>,
    receiver: Arc<dyn ValueReceiver<T>>,
}

/// An output port able to connect with any number of consumers.
///
/// At connect time the peer is asked for a receiver of `T`; failing that,
/// each registered [`OutputVariant`] is tried in declaration order, and a
/// thin conversion adapter is interposed for the first match. A peer
/// offering none of the types is rejected with
/// [`PortError::TypeMismatch`].
///
/// [`send`](Self::send) delivers a copy of the value to every connected
/// consumer in insertion order.
pub struct ProducerPort<T> {
    myself: Weak<ProducerPort<T>>,
    variants: Vec<OutputVariant<T>>,
    consumers: Mutex<Vec<Connection<T>>>,
    transactions: AtomicUsize,
}

impl<T: Clone + Send + Sync + 'static> ProducerPort<T> {
    pub fn new() -> Arc<Self> {
        Self::with_variants(Vec::new())
    }

    /// Create a producer that additionally feeds consumers of the variant
    /// types, trying them in the given order.
    pub fn with_variants(variants: Vec<OutputVariant<T>>) -> Arc<Self> {
        Arc::new_cyclic(|myself| Self {
            myself: myself.clone(),
            variants,
            consumers: Mutex::new(Vec::new()),
            transactions: AtomicUsize::new(0),
        })
    }

    /// Deliver `value` to every connected consumer, in insertion order.
    ///
    /// A send that returns has delivered to every peer present when the call
    /// started; concurrent topology changes may or may not be observed.
    pub async fn send(&self, value: T) {
        self.transactions.fetch_add(1, Ordering::Relaxed);

        let receivers: Vec<Arc<dyn ValueReceiver<T>>> = self
            .lock_consumers()
            .iter()
            .map(|connection| connection.receiver.clone())
            .collect();

        let source = self.id();

        for receiver in receivers {
            receiver.receive(value.clone(), source).await;
        }
    }

    pub fn connection_count(&self) -> usize {
        self.lock_consumers().len()
    }

    fn resolve_receiver(&self, peer: &PortRef) -> Option<Arc<dyn ValueReceiver<T>>> {
        if let Some(endpoint) = peer.consumer_endpoint(TypeId::of::<T>()) {
            if let Some(receiver) = endpoint.downcast::<Arc<dyn ValueReceiver<T>>>() {
                return Some(receiver);
            }
        }

        for variant in &self.variants {
            if let Some(endpoint) = peer.consumer_endpoint(variant.target) {
                if let Some(receiver) = (variant.adapt)(endpoint) {
                    return Some(receiver);
                }
            }
        }

        None
    }

    fn owner(&self) -> Option<PortRef> {
        let me: PortRef = self.myself.upgrade()?;
        Some(me)
    }

    fn lock_consumers(&self) -> MutexGuard<'_, Vec<Connection<T>>> {
        self.consumers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Send + Sync + 'static> Port for ProducerPort<T> {
    fn connect(&self, peer: &PortRef) -> Result<(), PortError> {
        let peer_id = PortId::of(peer);

        if self
            .lock_consumers()
            .iter()
            .any(|connection| connection.id == peer_id)
        {
            return Ok(());
        }

        let receiver = self.resolve_receiver(peer).ok_or(PortError::TypeMismatch)?;
        let owner = self.owner().ok_or(PortError::NotConnected)?;

        self.lock_consumers().push(Connection {
            id: peer_id,
            port: Arc::downgrade(peer),
            receiver,
        });

        if let Err(err) = peer.connect(&owner) {
            self.lock_consumers()
                .retain(|connection| connection.id != peer_id);
            return Err(err);
        }

        Ok(())
    }

    fn disconnect_all(&self) {
        let Some(owner) = self.owner() else { return };
        let connections = std::mem::take(&mut *self.lock_consumers());

        for connection in connections {
            if let Some(peer) = connection.port.upgrade() {
                peer.disconnect_peer(&owner);
            }
        }
    }

    fn disconnect_peer(&self, peer: &PortRef) {
        let Some(owner) = self.owner() else { return };
        let peer_id = PortId::of(peer);

        let was_connected = {
            let mut consumers = self.lock_consumers();
            let before = consumers.len();
            consumers.retain(|connection| connection.id != peer_id);
            consumers.len() != before
        };

        if was_connected {
            peer.disconnect_peer(&owner);
        }
    }

    fn is_connected(&self) -> bool {
        self.connection_count() > 0
    }

    fn status(&self) -> PortStatus {
        PortStatus {
            connections: self.connection_count(),
            transactions: self.transactions.load(Ordering::Relaxed),
        }
    }

    fn id(&self) -> PortId {
        PortId::of_weak(&self.myself)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{BufferedConsumerPort, CallbackConsumerPort};
    use crate::traits::port_ref;
    use crate::utils::Mutexed;

    #[tokio::test]
    async fn send_reaches_every_consumer_in_insertion_order() {
        let producer = ProducerPort::<i32>::new();
        let log = Arc::new(Mutexed::new(Vec::<(u8, i32)>::new()));

        let first = {
            let log = log.clone();
            CallbackConsumerPort::new(move |value| log.write(|entries| entries.push((1, value))))
        };
        let second = {
            let log = log.clone();
            CallbackConsumerPort::new(move |value| log.write(|entries| entries.push((2, value))))
        };

        producer.connect(&port_ref(&first)).unwrap();
        producer.connect(&port_ref(&second)).unwrap();
        producer.send(42).await;

        assert_eq!(log.load(), vec![(1, 42), (2, 42)]);
        assert_eq!(producer.status().transactions, 1);
        assert_eq!(producer.status().connections, 2);
    }

    #[tokio::test]
    async fn incompatible_consumer_is_rejected_without_changes() {
        let producer = ProducerPort::<i32>::new();
        let strings = BufferedConsumerPort::<String>::with_capacity(1).unwrap();

        let err = producer.connect(&port_ref(&strings)).unwrap_err();

        assert!(matches!(err, PortError::TypeMismatch));
        assert!(!producer.is_connected());
        assert!(!strings.is_connected());
    }

    #[tokio::test]
    async fn variant_conversion_feeds_consumers_of_related_types() {
        let producer =
            ProducerPort::<i32>::with_variants(vec![OutputVariant::converting(|value: &i32| {
                i64::from(*value)
            })]);
        let wide = BufferedConsumerPort::<i64>::with_capacity(1).unwrap();

        producer.connect(&port_ref(&wide)).unwrap();
        producer.send(7).await;

        assert_eq!(wide.get_next().await, Some(7i64));
    }

    #[tokio::test]
    async fn duplicate_connect_is_idempotent() {
        let producer = ProducerPort::<i32>::new();
        let consumer = BufferedConsumerPort::<i32>::with_capacity(1).unwrap();
        let peer = port_ref(&consumer);

        producer.connect(&peer).unwrap();
        producer.connect(&peer).unwrap();

        assert_eq!(producer.connection_count(), 1);
        assert_eq!(consumer.status().connections, 1);
    }

    #[tokio::test]
    async fn disconnect_severs_both_sides() {
        let producer = ProducerPort::<i32>::new();
        let consumer = BufferedConsumerPort::<i32>::with_capacity(1).unwrap();
        let peer = port_ref(&consumer);

        producer.connect(&peer).unwrap();
        producer.disconnect_all();

        assert!(!producer.is_connected());
        assert!(!consumer.is_connected());

        producer.disconnect_all(); // idempotent
    }
}
