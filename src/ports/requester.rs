// SPDX-License-Identifier: MIT

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::errors::PortError;
use crate::traits::{ErasedEndpoint, Port, PortId, PortRef, PortStatus, RespondTo};

/// Declares that a requester expecting `R` also accepts responders that
/// natively produce another type `V`, converting each response into an `R`.
pub struct ResponseVariant<Q, R> {
    signature: TypeId,
    adapt: Arc<dyn Fn(ErasedEndpoint) -> Option<Arc<dyn RespondTo<Q, R>>> + Send + Sync>,
}

impl<Q, R> ResponseVariant<Q, R>
where
    Q: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    /// Accept responders producing `V`, converting each response with
    /// `convert`.
    pub fn converting<V, F>(convert: F) -> Self
    where
        V: Send + Sync + 'static,
        F: Fn(V) -> R + Send + Sync + 'static,
    {
        let convert = Arc::new(convert);

        Self {
            signature: TypeId::of::<(Q, V)>(),
            adapt: Arc::new(move |endpoint| {
                let responder = endpoint.downcast::<Arc<dyn RespondTo<Q, V>>>()?;
                let adapter: Arc<dyn RespondTo<Q, R>> = Arc::new(ResponseAdapter {
                    responder,
                    convert: convert.clone(),
                });
                Some(adapter)
            }),
        }
    }

    /// Accept responders producing `V` through its `Into<R>` conversion.
    pub fn from_type<V>() -> Self
    where
        V: Into<R> + Send + Sync + 'static,
    {
        Self::converting(V::into)
    }
}

struct ResponseAdapter<Q, R, V> {
    responder: Arc<dyn RespondTo<Q, V>>,
    convert: Arc<dyn Fn(V) -> R + Send + Sync>,
}

impl<Q, R, V> RespondTo<Q, R> for ResponseAdapter<Q, R, V>
where
    Q: Send + Sync + 'static,
    R: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn respond(&self, request: Q) -> R {
        (self.convert)(self.responder.respond(request))
    }
}

type Connection<Q, R> = (PortId, Weak<dyn Port>, Arc<dyn RespondTo<Q, R>>);

/// The calling side of synchronous request/response. At most one responder
/// may be connected; [`request`](Self::request) invokes it on the calling
/// task and returns its response.
pub struct RequesterPort<Q, R> {
    myself: Weak<RequesterPort<Q, R>>,
    connection: Mutex<Option<Connection<Q, R>>>,
    variants: Vec<ResponseVariant<Q, R>>,
    transactions: AtomicUsize,
}

impl<Q, R> RequesterPort<Q, R>
where
    Q: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    pub fn new() -> Arc<Self> {
        Self::with_variants(Vec::new())
    }

    /// Create a requester that also accepts responders producing the given
    /// variant types, tried in the given order.
    pub fn with_variants(variants: Vec<ResponseVariant<Q, R>>) -> Arc<Self> {
        Arc::new_cyclic(|myself| Self {
            myself: myself.clone(),
            connection: Mutex::new(None),
            variants,
            transactions: AtomicUsize::new(0),
        })
    }

    /// Call the connected responder and return its response.
    pub fn request(&self, request: Q) -> Result<R, PortError> {
        let responder = self
            .lock_connection()
            .as_ref()
            .map(|(_, _, responder)| responder.clone())
            .ok_or(PortError::NotConnected)?;

        self.transactions.fetch_add(1, Ordering::Relaxed);
        Ok(responder.respond(request))
    }

    fn resolve_responder(&self, peer: &PortRef) -> Option<Arc<dyn RespondTo<Q, R>>> {
        if let Some(endpoint) = peer.responder_endpoint(TypeId::of::<(Q, R)>()) {
            if let Some(responder) = endpoint.downcast::<Arc<dyn RespondTo<Q, R>>>() {
                return Some(responder);
            }
        }

        for variant in &self.variants {
            if let Some(endpoint) = peer.responder_endpoint(variant.signature) {
                if let Some(responder) = (variant.adapt)(endpoint) {
                    return Some(responder);
                }
            }
        }

        None
    }

    fn owner(&self) -> Option<PortRef> {
        let me: PortRef = self.myself.upgrade()?;
        Some(me)
    }

    fn lock_connection(&self) -> MutexGuard<'_, Option<Connection<Q, R>>> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<Q, R> Port for RequesterPort<Q, R>
where
    Q: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    fn connect(&self, peer: &PortRef) -> Result<(), PortError> {
        let peer_id = PortId::of(peer);

        {
            let connection = self.lock_connection();

            if let Some((current, _, _)) = connection.as_ref() {
                if *current == peer_id {
                    return Ok(());
                }
                return Err(PortError::CardinalityViolation);
            }
        }

        let responder = self
            .resolve_responder(peer)
            .ok_or(PortError::TypeMismatch)?;
        let owner = self.owner().ok_or(PortError::NotConnected)?;

        *self.lock_connection() = Some((peer_id, Arc::downgrade(peer), responder));

        if let Err(err) = peer.connect(&owner) {
            *self.lock_connection() = None;
            return Err(err);
        }

        Ok(())
    }

    fn disconnect_all(&self) {
        let Some(owner) = self.owner() else { return };

        if let Some((_, weak, _)) = self.lock_connection().take() {
            if let Some(peer) = weak.upgrade() {
                peer.disconnect_peer(&owner);
            }
        }
    }

    fn disconnect_peer(&self, peer: &PortRef) {
        let connected_to_peer = self
            .lock_connection()
            .as_ref()
            .is_some_and(|(id, _, _)| *id == PortId::of(peer));

        if connected_to_peer {
            self.disconnect_all();
        }
    }

    fn is_connected(&self) -> bool {
        self.lock_connection().is_some()
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
    use crate::ports::{RespondVariant, ResponderPort};
    use crate::traits::port_ref;

    #[tokio::test]
    async fn request_invokes_the_connected_responder() {
        let requester = RequesterPort::<i32, i32>::new();
        let responder = ResponderPort::new(|x: i32| 10 * x);

        requester.connect(&port_ref(&responder)).unwrap();

        assert_eq!(requester.request(4).unwrap(), 40);
        assert_eq!(requester.status().transactions, 1);
        assert_eq!(responder.status().transactions, 1);
    }

    #[tokio::test]
    async fn request_without_a_peer_fails() {
        let requester = RequesterPort::<i32, i32>::new();
        assert!(matches!(
            requester.request(1).unwrap_err(),
            PortError::NotConnected
        ));
    }

    #[tokio::test]
    async fn mismatched_signature_is_rejected() {
        let requester = RequesterPort::<i32, String>::new();
        let responder = ResponderPort::new(|x: i32| 2 * x);

        let err = requester.connect(&port_ref(&responder)).unwrap_err();
        assert!(matches!(err, PortError::TypeMismatch));
        assert!(!requester.is_connected());
        assert!(!responder.is_connected());
    }

    #[tokio::test]
    async fn a_second_responder_is_rejected() {
        let requester = RequesterPort::<i32, i32>::new();
        let first = ResponderPort::new(|x: i32| x);
        let second = ResponderPort::new(|x: i32| -x);

        requester.connect(&port_ref(&first)).unwrap();
        let err = requester.connect(&port_ref(&second)).unwrap_err();

        assert!(matches!(err, PortError::CardinalityViolation));
        assert!(!second.is_connected());
    }

    #[tokio::test]
    async fn one_responder_serves_many_requesters() {
        let responder = ResponderPort::new(|x: i32| x + 1);
        let a = RequesterPort::<i32, i32>::new();
        let b = RequesterPort::<i32, i32>::new();

        a.connect(&port_ref(&responder)).unwrap();
        b.connect(&port_ref(&responder)).unwrap();

        assert_eq!(a.request(1).unwrap(), 2);
        assert_eq!(b.request(2).unwrap(), 3);
        assert_eq!(responder.status().connections, 2);
    }

    #[tokio::test]
    async fn requester_variant_adapts_a_narrower_responder() {
        let requester =
            RequesterPort::<i32, i64>::with_variants(vec![ResponseVariant::from_type::<i32>()]);
        let responder = ResponderPort::new(|x: i32| 3 * x);

        requester.connect(&port_ref(&responder)).unwrap();
        assert_eq!(requester.request(3).unwrap(), 9i64);
    }

    #[tokio::test]
    async fn responder_variant_serves_a_wider_requester() {
        let responder = ResponderPort::with_variants(
            vec![RespondVariant::converting(|x: i32| x != 0)],
            |x: i32| 42 * x,
        );
        let requester = RequesterPort::<i32, bool>::new();

        requester.connect(&port_ref(&responder)).unwrap();
        assert!(requester.request(1).unwrap());
    }

    #[tokio::test]
    async fn disconnect_severs_both_sides() {
        let requester = RequesterPort::<i32, i32>::new();
        let responder = ResponderPort::new(|x: i32| x);

        requester.connect(&port_ref(&responder)).unwrap();
        requester.disconnect_all();

        assert!(!requester.is_connected());
        assert!(!responder.is_connected());
        requester.disconnect_all(); // idempotent
    }
}
