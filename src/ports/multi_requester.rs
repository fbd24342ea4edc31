// SPDX-License-Identifier: MIT

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::task::JoinHandle;

use crate::errors::PortError;
use crate::traits::{Port, PortId, PortRef, PortStatus, RespondTo};

type Connection<Q, R> = (PortId, Weak<dyn Port>, Arc<dyn RespondTo<Q, R>>);

/// A requester fanning one request out to every connected responder.
///
/// [`request`](Self::request) calls the responders one by one on the calling
/// task and collects their responses in connection order.
/// [`request_async`](Self::request_async) instead spawns one task per
/// responder and returns their join handles; an individual responder's
/// failure propagates through its handle without affecting the others.
pub struct MultiRequesterPort<Q, R> {
    myself: Weak<MultiRequesterPort<Q, R>>,
    responders: Mutex<Vec<Connection<Q, R>>>,
    transactions: AtomicUsize,
}

impl<Q, R> MultiRequesterPort<Q, R>
where
    Q: Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|myself| Self {
            myself: myself.clone(),
            responders: Mutex::new(Vec::new()),
            transactions: AtomicUsize::new(0),
        })
    }

    /// Call every connected responder in connection order and collect the
    /// responses. An unconnected port yields an empty vector.
    pub fn request(&self, request: Q) -> Vec<R> {
        let responders = self.snapshot();
        self.transactions.fetch_add(1, Ordering::Relaxed);

        responders
            .iter()
            .map(|responder| responder.respond(request.clone()))
            .collect()
    }

    /// Spawn one task per connected responder and return the join handles,
    /// in connection order.
    pub fn request_async(&self, request: Q) -> Vec<JoinHandle<R>> {
        let responders = self.snapshot();
        self.transactions.fetch_add(1, Ordering::Relaxed);

        responders
            .into_iter()
            .map(|responder| {
                let request = request.clone();
                tokio::spawn(async move { responder.respond(request) })
            })
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.lock_responders().len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn RespondTo<Q, R>>> {
        self.lock_responders()
            .iter()
            .map(|(_, _, responder)| responder.clone())
            .collect()
    }

    fn owner(&self) -> Option<PortRef> {
        let me: PortRef = self.myself.upgrade()?;
        Some(me)
    }

    fn lock_responders(&self) -> MutexGuard<'_, Vec<Connection<Q, R>>> {
        self.responders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<Q, R> Port for MultiRequesterPort<Q, R>
where
    Q: Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    fn connect(&self, peer: &PortRef) -> Result<(), PortError> {
        let peer_id = PortId::of(peer);

        if self
            .lock_responders()
            .iter()
            .any(|(id, _, _)| *id == peer_id)
        {
            return Ok(());
        }

        let endpoint = peer
            .responder_endpoint(TypeId::of::<(Q, R)>())
            .ok_or(PortError::TypeMismatch)?;
        let responder = endpoint
            .downcast::<Arc<dyn RespondTo<Q, R>>>()
            .ok_or(PortError::TypeMismatch)?;
        let owner = self.owner().ok_or(PortError::NotConnected)?;

        self.lock_responders()
            .push((peer_id, Arc::downgrade(peer), responder));

        if let Err(err) = peer.connect(&owner) {
            self.lock_responders().retain(|(id, _, _)| *id != peer_id);
            return Err(err);
        }

        Ok(())
    }

    fn disconnect_all(&self) {
        let Some(owner) = self.owner() else { return };
        let responders = std::mem::take(&mut *self.lock_responders());

        for (_, weak, _) in responders {
            if let Some(peer) = weak.upgrade() {
                peer.disconnect_peer(&owner);
            }
        }
    }

    fn disconnect_peer(&self, peer: &PortRef) {
        let Some(owner) = self.owner() else { return };
        let peer_id = PortId::of(peer);

        let was_connected = {
            let mut responders = self.lock_responders();
            let before = responders.len();
            responders.retain(|(id, _, _)| *id != peer_id);
            responders.len() != before
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
