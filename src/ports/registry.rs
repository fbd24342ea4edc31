// SPDX-License-Identifier: MIT

use std::sync::{Mutex, MutexGuard, PoisonError, Weak};

use crate::errors::PortError;
use crate::traits::{Port, PortId, PortRef};

/// How many peers a port accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectPolicy {
    /// At most one peer; a second distinct peer is rejected.
    Single,
    /// Any number of peers.
    Multi,
}

/// Per-port bookkeeping of connected peers.
///
/// The registry tracks connections only and is agnostic to communication;
/// ports own one to enforce their [`ConnectPolicy`] and to keep connect and
/// disconnect symmetric. Peers are stored by identity with weak
/// back-references, so registries never keep a peer alive.
///
/// `connect` registers the peer and then asks it to register the owner in
/// return; if that reciprocal call fails, the registration is rolled back and
/// the error propagates, leaving both sides unchanged. Disconnects are
/// infallible and idempotent.
pub struct ConnectionRegistry {
    policy: ConnectPolicy,
    peers: Mutex<Vec<(PortId, Weak<dyn Port>)>>,
}

impl ConnectionRegistry {
    pub fn new(policy: ConnectPolicy) -> Self {
        Self {
            policy,
            peers: Mutex::new(Vec::new()),
        }
    }

    /// Register `peer` and call `peer.connect(owner)`.
    pub fn connect(&self, owner: &PortRef, peer: &PortRef) -> Result<(), PortError> {
        let peer_id = PortId::of(peer);

        {
            let mut peers = self.lock_peers();

            if peers.iter().any(|(id, _)| *id == peer_id) {
                return Ok(());
            }

            if self.policy == ConnectPolicy::Single && !peers.is_empty() {
                return Err(PortError::CardinalityViolation);
            }

            peers.push((peer_id, std::sync::Arc::downgrade(peer)));
        }

        if let Err(err) = peer.connect(owner) {
            self.lock_peers().retain(|(id, _)| *id != peer_id);
            return Err(err);
        }

        Ok(())
    }

    /// Disconnect from all registered peers, notifying each of them.
    pub fn disconnect_all(&self, owner: &PortRef) {
        let peers = std::mem::take(&mut *self.lock_peers());

        for (_, weak) in peers {
            if let Some(peer) = weak.upgrade() {
                peer.disconnect_peer(owner);
            }
        }
    }

    /// Disconnect from `peer` if registered, notifying it; otherwise no-op.
    pub fn disconnect_peer(&self, owner: &PortRef, peer: &PortRef) {
        let peer_id = PortId::of(peer);
        let was_registered = {
            let mut peers = self.lock_peers();
            let before = peers.len();
            peers.retain(|(id, _)| *id != peer_id);
            peers.len() != before
        };

        if was_registered {
            peer.disconnect_peer(owner);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.lock_peers().len()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_count() > 0
    }

    /// Whether `peer` is currently registered.
    pub fn has_peer(&self, peer: &PortRef) -> bool {
        let peer_id = PortId::of(peer);
        self.lock_peers().iter().any(|(id, _)| *id == peer_id)
    }

    fn lock_peers(&self) -> MutexGuard<'_, Vec<(PortId, Weak<dyn Port>)>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{port_ref, PortStatus};
    use std::any::Any;
    use std::sync::{Arc, Weak};

    /// Minimal port whose connect/disconnect delegate to its own registry.
    struct LoopbackPort {
        myself: Weak<LoopbackPort>,
        registry: ConnectionRegistry,
    }

    impl LoopbackPort {
        fn new(policy: ConnectPolicy) -> Arc<Self> {
            Arc::new_cyclic(|myself| Self {
                myself: myself.clone(),
                registry: ConnectionRegistry::new(policy),
            })
        }

        fn owner(&self) -> PortRef {
            self.myself.upgrade().expect("port is alive in tests")
        }
    }

    impl Port for LoopbackPort {
        fn connect(&self, peer: &PortRef) -> Result<(), PortError> {
            self.registry.connect(&self.owner(), peer)
        }

        fn disconnect_all(&self) {
            self.registry.disconnect_all(&self.owner());
        }

        fn disconnect_peer(&self, peer: &PortRef) {
            self.registry.disconnect_peer(&self.owner(), peer);
        }

        fn is_connected(&self) -> bool {
            self.registry.is_connected()
        }

        fn status(&self) -> PortStatus {
            PortStatus {
                connections: self.registry.connection_count(),
                transactions: PortStatus::UNDEFINED,
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

    #[test]
    fn connect_is_symmetric() {
        let a = LoopbackPort::new(ConnectPolicy::Multi);
        let b = LoopbackPort::new(ConnectPolicy::Multi);

        a.connect(&port_ref(&b)).unwrap();

        assert!(a.is_connected());
        assert!(b.is_connected());
    }

    #[test]
    fn duplicate_connect_is_a_no_op() {
        let a = LoopbackPort::new(ConnectPolicy::Multi);
        let b = LoopbackPort::new(ConnectPolicy::Multi);

        a.connect(&port_ref(&b)).unwrap();
        a.connect(&port_ref(&b)).unwrap();

        assert_eq!(a.registry.connection_count(), 1);
        assert_eq!(b.registry.connection_count(), 1);
    }

    #[test]
    fn single_policy_rejects_a_second_peer() {
        let single = LoopbackPort::new(ConnectPolicy::Single);
        let first = LoopbackPort::new(ConnectPolicy::Multi);
        let second = LoopbackPort::new(ConnectPolicy::Multi);

        single.connect(&port_ref(&first)).unwrap();
        let err = single.connect(&port_ref(&second)).unwrap_err();

        assert!(matches!(err, PortError::CardinalityViolation));
        assert_eq!(single.registry.connection_count(), 1);
        assert!(!second.is_connected());
    }

    #[test]
    fn failed_reciprocal_connect_rolls_back() {
        // The multi-port connects to a single-port that is already taken:
        // the reciprocal registration fails and the first insert unwinds.
        let taken = LoopbackPort::new(ConnectPolicy::Single);
        let first = LoopbackPort::new(ConnectPolicy::Multi);
        taken.connect(&port_ref(&first)).unwrap();

        let late = LoopbackPort::new(ConnectPolicy::Multi);
        let err = late.connect(&port_ref(&taken)).unwrap_err();

        assert!(matches!(err, PortError::CardinalityViolation));
        assert!(!late.is_connected());
        assert_eq!(taken.registry.connection_count(), 1);
    }

    #[test]
    fn disconnect_all_severs_both_sides() {
        let a = LoopbackPort::new(ConnectPolicy::Multi);
        let b = LoopbackPort::new(ConnectPolicy::Multi);
        let c = LoopbackPort::new(ConnectPolicy::Multi);

        a.connect(&port_ref(&b)).unwrap();
        a.connect(&port_ref(&c)).unwrap();
        a.disconnect_all();

        assert!(!a.is_connected());
        assert!(!b.is_connected());
        assert!(!c.is_connected());
    }

    #[test]
    fn disconnect_is_idempotent() {
        let a = LoopbackPort::new(ConnectPolicy::Multi);
        let b = LoopbackPort::new(ConnectPolicy::Multi);

        a.connect(&port_ref(&b)).unwrap();
        a.disconnect_peer(&port_ref(&b));
        a.disconnect_peer(&port_ref(&b));
        a.disconnect_all();

        assert!(!a.is_connected());
        assert!(!b.is_connected());
    }
}
