// SPDX-License-Identifier: MIT

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::errors::PortError;
use crate::traits::{Port, PortId, PortRef, PortStatus};

use super::registry::{ConnectPolicy, ConnectionRegistry};

/// The hosting side of a capability port: wraps a shared implementation of
/// `I` and hands access to connected clients.
///
/// Intended for capability handoff rather than data flow; there is no
/// queueing. `get` fails with [`PortError::NotConnected`] while no client is
/// connected.
pub struct InterfaceHost<I: ?Sized + Send + Sync + 'static> {
    myself: Weak<InterfaceHost<I>>,
    handle: Arc<I>,
    registry: ConnectionRegistry,
    transactions: AtomicUsize,
}

impl<I: ?Sized + Send + Sync + 'static> InterfaceHost<I> {
    pub fn new(handle: Arc<I>) -> Arc<Self> {
        Arc::new_cyclic(|myself| Self {
            myself: myself.clone(),
            handle,
            registry: ConnectionRegistry::new(ConnectPolicy::Multi),
            transactions: AtomicUsize::new(0),
        })
    }

    /// Shared access to the hosted implementation.
    pub fn get(&self) -> Result<Arc<I>, PortError> {
        self.transactions.fetch_add(1, Ordering::Relaxed);

        if !self.is_connected() {
            return Err(PortError::NotConnected);
        }

        Ok(self.handle.clone())
    }

    fn owner(&self) -> Option<PortRef> {
        let me: PortRef = self.myself.upgrade()?;
        Some(me)
    }
}

impl<I: ?Sized + Send + Sync + 'static> Port for InterfaceHost<I> {
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
}

/// The consuming side of a capability port: caches the connected host and
/// forwards `get` to it.
///
/// Reconnecting to a different host replaces the previous connection.
pub struct InterfaceClient<I: ?Sized + Send + Sync + 'static> {
    myself: Weak<InterfaceClient<I>>,
    host: Mutex<Option<Arc<InterfaceHost<I>>>>,
    transactions: AtomicUsize,
}

impl<I: ?Sized + Send + Sync + 'static> InterfaceClient<I> {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|myself| Self {
            myself: myself.clone(),
            host: Mutex::new(None),
            transactions: AtomicUsize::new(0),
        })
    }

    /// Shared access to the connected host's implementation.
    pub fn get(&self) -> Result<Arc<I>, PortError> {
        self.transactions.fetch_add(1, Ordering::Relaxed);

        let host = self
            .lock_host()
            .clone()
            .ok_or(PortError::NotConnected)?;

        host.get()
    }

    fn owner(&self) -> Option<PortRef> {
        let me: PortRef = self.myself.upgrade()?;
        Some(me)
    }

    fn lock_host(&self) -> MutexGuard<'_, Option<Arc<InterfaceHost<I>>>> {
        self.host.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<I: ?Sized + Send + Sync + 'static> Port for InterfaceClient<I> {
    fn connect(&self, peer: &PortRef) -> Result<(), PortError> {
        let peer_id = PortId::of(peer);

        {
            let host = self.lock_host();
            if let Some(current) = host.as_ref() {
                if current.id() == peer_id {
                    return Ok(());
                }
            }
        }

        let host = peer
            .clone()
            .as_any_arc()
            .downcast::<InterfaceHost<I>>()
            .map_err(|_| PortError::TypeMismatch)?;

        // A client follows at most one host; a new host replaces the old.
        if self.lock_host().is_some() {
            self.disconnect_all();
        }

        let owner = self.owner().ok_or(PortError::NotConnected)?;
        *self.lock_host() = Some(host);

        if let Err(err) = peer.connect(&owner) {
            *self.lock_host() = None;
            return Err(err);
        }

        Ok(())
    }

    fn disconnect_all(&self) {
        let Some(owner) = self.owner() else { return };

        if let Some(host) = self.lock_host().take() {
            host.disconnect_peer(&owner);
        }
    }

    fn disconnect_peer(&self, peer: &PortRef) {
        let connected = self
            .lock_host()
            .as_ref()
            .is_some_and(|host| host.id() == PortId::of(peer));

        if connected {
            self.disconnect_all();
        }
    }

    fn is_connected(&self) -> bool {
        self.lock_host().is_some()
    }

    fn status(&self) -> PortStatus {
        PortStatus {
            connections: usize::from(self.is_connected()),
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
    use crate::traits::port_ref;
    use std::sync::atomic::AtomicI64;

    trait Tally: Send + Sync + std::fmt::Debug {
        fn bump(&self) -> i64;
    }

    #[derive(Debug)]
    struct Counter {
        count: AtomicI64,
    }

    impl Tally for Counter {
        fn bump(&self) -> i64 {
            self.count.fetch_add(1, Ordering::Relaxed) + 1
        }
    }

    fn host() -> Arc<InterfaceHost<dyn Tally>> {
        let counter: Arc<dyn Tally> = Arc::new(Counter {
            count: AtomicI64::new(0),
        });
        InterfaceHost::new(counter)
    }

    #[tokio::test]
    async fn client_reaches_the_hosted_interface() {
        let host = host();
        let client = InterfaceClient::<dyn Tally>::new();

        client.connect(&port_ref(&host)).unwrap();

        assert_eq!(client.get().unwrap().bump(), 1);
        assert_eq!(client.get().unwrap().bump(), 2);
        assert_eq!(client.status().transactions, 2);
        assert!(host.status().transactions >= 2);
    }

    #[tokio::test]
    async fn get_fails_while_unconnected_on_both_sides() {
        let host = host();
        let client = InterfaceClient::<dyn Tally>::new();

        assert!(matches!(client.get().unwrap_err(), PortError::NotConnected));
        assert!(matches!(host.get().unwrap_err(), PortError::NotConnected));
    }

    #[tokio::test]
    async fn a_mismatched_peer_is_rejected() {
        let client = InterfaceClient::<dyn Tally>::new();
        let other = crate::ports::ProducerPort::<i32>::new();

        let err = client.connect(&port_ref(&other)).unwrap_err();
        assert!(matches!(err, PortError::TypeMismatch));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn reconnecting_replaces_the_previous_host() {
        let first = host();
        let second = host();
        let client = InterfaceClient::<dyn Tally>::new();

        client.connect(&port_ref(&first)).unwrap();
        client.connect(&port_ref(&second)).unwrap();

        assert!(!first.is_connected());
        assert!(second.is_connected());
        assert_eq!(client.status().connections, 1);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_symmetric() {
        let host = host();
        let client = InterfaceClient::<dyn Tally>::new();

        client.connect(&port_ref(&host)).unwrap();
        client.disconnect_all();
        client.disconnect_all();

        assert!(!client.is_connected());
        assert!(!host.is_connected());
    }
}
