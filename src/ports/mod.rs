// SPDX-License-Identifier: MIT

//! The port family: the only way proxels exchange data or capabilities.
//!
//! Push-style data flow is a [`ProducerPort`] fanning out to consumers —
//! queue-buffered ([`BufferedConsumerPort`]), per-source keyed
//! ([`MultiConsumerPort`]) or synchronous ([`CallbackConsumerPort`]).
//! Request/response is a [`RequesterPort`] or [`MultiRequesterPort`] calling
//! [`ResponderPort`] callbacks. Capability handoff is an
//! [`InterfaceHost`]/[`InterfaceClient`] pair.
//!
//! Ports are created as `Arc`s and wired with
//! [`Port::connect`](crate::traits::Port::connect); connections are
//! symmetric, rolled back on failure, and severed with infallible
//! disconnects. A port of type `T` can also interoperate with peers of
//! related types through [`OutputVariant`]/[`InputVariant`] conversion
//! tables resolved at connect time.

pub mod buffered;
pub mod callback;
pub mod interface;
pub mod multi;
pub mod multi_requester;
pub mod producer;
pub mod registry;
pub mod requester;
pub mod responder;

pub use buffered::{BufferedConsumerPort, ConsumerOptions};
pub use callback::CallbackConsumerPort;
pub use interface::{InterfaceClient, InterfaceHost};
pub use multi::MultiConsumerPort;
pub use multi_requester::MultiRequesterPort;
pub use producer::{OutputVariant, ProducerPort};
pub use registry::{ConnectPolicy, ConnectionRegistry};
pub use requester::{RequesterPort, ResponseVariant};
pub use responder::{RespondVariant, ResponderPort};

use std::sync::Arc;

use async_trait::async_trait;

use crate::traits::{ErasedEndpoint, PortId, ValueReceiver};

/// Declares that a consumer of `T` also accepts values of another type `U`,
/// converting each incoming `U` into a `T`.
pub struct InputVariant<T> {
    source: std::any::TypeId,
    wrap: Arc<dyn Fn(Arc<dyn ValueReceiver<T>>) -> ErasedEndpoint + Send + Sync>,
}

impl<T: Send + Sync + 'static> InputVariant<T> {
    /// Accept values of type `U`, converted with `convert`.
    pub fn converting<U, F>(convert: F) -> Self
    where
        U: Send + Sync + 'static,
        F: Fn(U) -> T + Send + Sync + 'static,
    {
        let convert = Arc::new(convert);

        Self {
            source: std::any::TypeId::of::<U>(),
            wrap: Arc::new(move |inner| {
                let adapter: Arc<dyn ValueReceiver<U>> = Arc::new(InputAdapter {
                    inner,
                    convert: convert.clone(),
                });
                ErasedEndpoint::new(adapter)
            }),
        }
    }

    /// Accept values of type `U` through its `Into<T>` conversion.
    pub fn from_type<U>() -> Self
    where
        U: Into<T> + Send + Sync + 'static,
    {
        Self::converting(U::into)
    }

    pub(crate) fn source(&self) -> std::any::TypeId {
        self.source
    }

    pub(crate) fn endpoint(&self, inner: Arc<dyn ValueReceiver<T>>) -> ErasedEndpoint {
        (self.wrap)(inner)
    }
}

struct InputAdapter<U, T> {
    inner: Arc<dyn ValueReceiver<T>>,
    convert: Arc<dyn Fn(U) -> T + Send + Sync>,
}

#[async_trait]
impl<U, T> ValueReceiver<U> for InputAdapter<U, T>
where
    U: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    async fn receive(&self, value: U, source: PortId) {
        self.inner.receive((self.convert)(value), source).await;
    }
}

/// Resolve the variant table of a consumer-side port against a queried
/// value type.
fn variant_endpoint<T>(
    variants: &[InputVariant<T>],
    value_type: std::any::TypeId,
    inner: Arc<dyn ValueReceiver<T>>,
) -> Option<ErasedEndpoint>
where
    T: Send + Sync + 'static,
{
    variants
        .iter()
        .find(|variant| variant.source() == value_type)
        .map(|variant| variant.endpoint(inner))
}
