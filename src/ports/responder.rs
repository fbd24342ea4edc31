// SPDX-License-Identifier: MIT

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::errors::PortError;
use crate::traits::{ErasedEndpoint, Port, PortId, PortRef, PortStatus, RespondTo};

use super::registry::{ConnectPolicy, ConnectionRegistry};

/// Declares that a responder producing `R` also serves requesters expecting
/// another type `V`, converting each response.
pub struct RespondVariant<Q, R> {
    signature: TypeId,
    wrap: Arc<dyn Fn(Arc<dyn RespondTo<Q, R>>) -> ErasedEndpoint + Send + Sync>,
}

impl<Q, R> RespondVariant<Q, R>
where
    Q: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    /// Serve requesters of `(Q, V)`, converting each response with `convert`.
    pub fn converting<V, F>(convert: F) -> Self
    where
        V: Send + Sync + 'static,
        F: Fn(R) -> V + Send + Sync + 'static,
    {
        let convert = Arc::new(convert);

        Self {
            signature: TypeId::of::<(Q, V)>(),
            wrap: Arc::new(move |inner| {
                let adapter: Arc<dyn RespondTo<Q, V>> = Arc::new(RespondAdapter {
                    inner,
                    convert: convert.clone(),
                });
                ErasedEndpoint::new(adapter)
            }),
        }
    }

    /// Serve requesters of `(Q, V)` through `R`'s `Into<V>` conversion.
    pub fn into_type<V>() -> Self
    where
        R: Into<V>,
        V: Send + Sync + 'static,
    {
        Self::converting(R::into)
    }
}

struct RespondAdapter<Q, R, V> {
    inner: Arc<dyn RespondTo<Q, R>>,
    convert: Arc<dyn Fn(R) -> V + Send + Sync>,
}

impl<Q, R, V> RespondTo<Q, V> for RespondAdapter<Q, R, V>
where
    Q: Send + Sync + 'static,
    R: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn respond(&self, request: Q) -> V {
        (self.convert)(self.inner.respond(request))
    }
}

/// The serving side of request/response: holds a user-supplied callback and
/// answers requests from any number of connected requesters.
pub struct ResponderPort<Q, R> {
    myself: Weak<ResponderPort<Q, R>>,
    callback: Box<dyn Fn(Q) -> R + Send + Sync>,
    registry: ConnectionRegistry,
    variants: Vec<RespondVariant<Q, R>>,
    transactions: AtomicUsize,
}

impl<Q, R> ResponderPort<Q, R>
where
    Q: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    pub fn new(callback: impl Fn(Q) -> R + Send + Sync + 'static) -> Arc<Self> {
        Self::with_variants(Vec::new(), callback)
    }

    /// As [`new`](Self::new), additionally serving requesters that expect
    /// the given variant response types.
    pub fn with_variants(
        variants: Vec<RespondVariant<Q, R>>,
        callback: impl Fn(Q) -> R + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new_cyclic(|myself| Self {
            myself: myself.clone(),
            callback: Box::new(callback),
            registry: ConnectionRegistry::new(ConnectPolicy::Multi),
            variants,
            transactions: AtomicUsize::new(0),
        })
    }

    /// Invoke the callback and return its result.
    pub fn respond(&self, request: Q) -> R {
        let response = (self.callback)(request);
        self.transactions.fetch_add(1, Ordering::Relaxed);
        response
    }

    fn owner(&self) -> Option<PortRef> {
        let me: PortRef = self.myself.upgrade()?;
        Some(me)
    }
}

impl<Q, R> RespondTo<Q, R> for ResponderPort<Q, R>
where
    Q: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    fn respond(&self, request: Q) -> R {
        ResponderPort::respond(self, request)
    }
}

impl<Q, R> Port for ResponderPort<Q, R>
where
    Q: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
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

    fn responder_endpoint(&self, signature: TypeId) -> Option<ErasedEndpoint> {
        let me = self.myself.upgrade()?;
        let responder: Arc<dyn RespondTo<Q, R>> = me;

        if signature == TypeId::of::<(Q, R)>() {
            return Some(ErasedEndpoint::new(responder));
        }

        self.variants
            .iter()
            .find(|variant| variant.signature == signature)
            .map(|variant| (variant.wrap)(responder))
    }
}
