// SPDX-License-Identifier: MIT

use std::any::{Any, TypeId};
use std::sync::{Arc, Weak};

use async_trait::async_trait;

use crate::errors::PortError;

/// Shared handle to any port.
pub type PortRef = Arc<dyn Port>;

/// Stable identity of a live port, derived from its allocation address.
///
/// Usable as a map key for peer bookkeeping; identities order ports
/// deterministically for as long as the ports are alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortId(usize);

impl PortId {
    pub fn of(port: &PortRef) -> Self {
        Self(Arc::as_ptr(port) as *const () as usize)
    }

    pub(crate) fn of_weak<P>(port: &Weak<P>) -> Self {
        Self(Weak::as_ptr(port) as *const () as usize)
    }
}

/// Statistics and status for a single port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortStatus {
    /// Number of peers connected to the port.
    pub connections: usize,
    /// Number of transactions passed through the port.
    pub transactions: usize,
}

impl PortStatus {
    /// Sentinel meaning "not tracked".
    pub const UNDEFINED: usize = usize::MAX;
}

/// An erased capability handed out by [`Port::consumer_endpoint`] and
/// [`Port::responder_endpoint`]; the querying side downcasts it back to the
/// typed endpoint it asked for.
pub struct ErasedEndpoint(Box<dyn Any + Send>);

impl ErasedEndpoint {
    pub fn new<E: Send + 'static>(endpoint: E) -> Self {
        Self(Box::new(endpoint))
    }

    pub fn downcast<E: 'static>(self) -> Option<E> {
        self.0.downcast().ok().map(|boxed| *boxed)
    }
}

/// Typed delivery seam between a producer and a consumer.
///
/// Producers resolve one of these per connected consumer at connect time and
/// deliver through it on every send. `source` identifies the sending port so
/// multi-source consumers can route into the right lane.
#[async_trait]
pub trait ValueReceiver<T>: Send + Sync {
    async fn receive(&self, value: T, source: PortId);
}

/// Typed call seam between a requester and a responder.
pub trait RespondTo<Q, R>: Send + Sync {
    fn respond(&self, request: Q) -> R;
}

/// Interface for interconnection between two entities exchanging data.
///
/// Connecting is symmetric: the called port registers its peer and then asks
/// the peer to register it back; a reciprocal failure rolls the first
/// registration back, so a failed connect leaves nothing changed.
/// Disconnects never fail and are idempotent.
///
/// Topology changes are not synchronised against live traffic; wire ports
/// before starting the graph or serialise externally.
pub trait Port: Send + Sync + 'static {
    /// Connect this port to `peer`. Does nothing if already connected to it.
    fn connect(&self, peer: &PortRef) -> Result<(), PortError>;

    /// Disconnect from every peer, notifying each of them.
    fn disconnect_all(&self);

    /// Disconnect from `peer` if connected to it, otherwise do nothing.
    fn disconnect_peer(&self, peer: &PortRef);

    fn is_connected(&self) -> bool;

    fn status(&self) -> PortStatus;

    fn id(&self) -> PortId;

    /// Unblock any reader waiting on this port's buffers, if it has any.
    fn deactivate(&self) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// If this port can consume values of the given type, return the erased
    /// receiver for it. Queried with the producer's value type first, then
    /// with each of the producer's variants.
    fn consumer_endpoint(&self, _value_type: TypeId) -> Option<ErasedEndpoint> {
        None
    }

    /// If this port can answer requests with the given `(request, response)`
    /// signature, return the erased responder for it.
    fn responder_endpoint(&self, _signature: TypeId) -> Option<ErasedEndpoint> {
        None
    }
}

/// Widen a concrete port handle to a [`PortRef`].
pub fn port_ref<P: Port>(port: &Arc<P>) -> PortRef {
    port.clone()
}
