// SPDX-License-Identifier: MIT

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;

use crate::errors::PortError;
use crate::traits::{ErasedEndpoint, Port, PortId, PortRef, PortStatus, ValueReceiver};

use super::registry::{ConnectPolicy, ConnectionRegistry};
use super::{variant_endpoint, InputVariant};

/// An input port invoking a user-provided callback for every received value,
/// synchronously on the producer's task.
pub struct CallbackConsumerPort<T> {
    myself: Weak<CallbackConsumerPort<T>>,
    callback: Box<dyn Fn(T) + Send + Sync>,
    registry: ConnectionRegistry,
    variants: Vec<InputVariant<T>>,
    transactions: AtomicUsize,
}

impl<T: Clone + Send + Sync + 'static> CallbackConsumerPort<T> {
    /// A single-producer callback port.
    pub fn new(callback: impl Fn(T) + Send + Sync + 'static) -> Arc<Self> {
        Self::with_variants(ConnectPolicy::Single, Vec::new(), callback)
    }

    pub fn with_policy(
        policy: ConnectPolicy,
        callback: impl Fn(T) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::with_variants(policy, Vec::new(), callback)
    }

    pub fn with_variants(
        policy: ConnectPolicy,
        variants: Vec<InputVariant<T>>,
        callback: impl Fn(T) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new_cyclic(|myself| Self {
            myself: myself.clone(),
            callback: Box::new(callback),
            registry: ConnectionRegistry::new(policy),
            variants,
            transactions: AtomicUsize::new(0),
        })
    }

    fn owner(&self) -> Option<PortRef> {
        let me: PortRef = self.myself.upgrade()?;
        Some(me)
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> ValueReceiver<T> for CallbackConsumerPort<T> {
    async fn receive(&self, value: T, _source: PortId) {
        (self.callback)(value);
        self.transactions.fetch_add(1, Ordering::Relaxed);
    }
}

impl<T: Clone + Send + Sync + 'static> Port for CallbackConsumerPort<T> {
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
    use crate::utils::Mutexed;

    #[tokio::test]
    async fn callback_runs_on_every_send() {
        let seen = Arc::new(Mutexed::new(Vec::<i32>::new()));
        let consumer = {
            let seen = seen.clone();
            CallbackConsumerPort::new(move |value| seen.write(|values| values.push(value)))
        };
        let producer = ProducerPort::<i32>::new();

        producer.connect(&port_ref(&consumer)).unwrap();
        producer.send(1).await;
        producer.send(2).await;

        assert_eq!(seen.load(), vec![1, 2]);
        assert_eq!(consumer.status().transactions, 2);
    }

    #[tokio::test]
    async fn multi_policy_accepts_several_producers() {
        let counter = Arc::new(AtomicUsize::new(0));
        let consumer = {
            let counter = counter.clone();
            CallbackConsumerPort::with_policy(ConnectPolicy::Multi, move |_: i32| {
                counter.fetch_add(1, Ordering::Relaxed);
            })
        };

        let a = ProducerPort::<i32>::new();
        let b = ProducerPort::<i32>::new();
        a.connect(&port_ref(&consumer)).unwrap();
        b.connect(&port_ref(&consumer)).unwrap();

        a.send(1).await;
        b.send(2).await;

        assert_eq!(counter.load(Ordering::Relaxed), 2);
        assert_eq!(consumer.status().connections, 2);
    }
}
