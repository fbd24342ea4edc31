// SPDX-License-Identifier: MIT

//! # superflow
//!
//! A dataflow runtime for building concurrent processing applications out of
//! independently developed units ("proxels") connected by typed ports.
//!
//! | Area          | Description                                                    | Key types                                            |
//! |---------------|----------------------------------------------------------------|------------------------------------------------------|
//! | **Ports**     | Typed push, request/response and capability endpoints.         | [`ports::ProducerPort`], [`ports::BufferedConsumerPort`], [`ports::RequesterPort`], [`ports::InterfaceHost`] |
//! | **Queues**    | Bounded FIFOs with drop-oldest or block-producer overflow.     | [`queue::BoundedQueue`], [`queue::KeyedMultiQueue`]  |
//! | **Proxels**   | Processing units with named ports and a start/stop lifecycle.  | [`traits::Proxel`], [`traits::ProxelCore`]           |
//! | **Graph**     | Owns proxels, runs one worker each, captures crashes.          | [`engine::Graph`]                                    |
//! | **Builder**   | Declarative graph construction from a factory registry.        | [`engine::GraphPlan`], [`engine::FactoryMap`]        |
//! | **Utilities** | Guarded cells, watchdog, rate limiting, signal handling.       | [`utils`]                                            |
//!
//! ```no_run
//! use std::any::Any;
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use superflow::errors::ProxelError;
//! use superflow::ports::{BufferedConsumerPort, ProducerPort};
//! use superflow::engine::Graph;
//! use superflow::traits::{port_ref, PortMap, Proxel, ProxelCore};
//!
//! struct Doubler {
//!     core: ProxelCore,
//!     input: Arc<BufferedConsumerPort<i32>>,
//!     output: Arc<ProducerPort<i32>>,
//! }
//!
//! impl Doubler {
//!     fn new() -> Arc<Self> {
//!         let input = BufferedConsumerPort::with_capacity(16).expect("valid capacity");
//!         let output = ProducerPort::new();
//!
//!         let mut ports = PortMap::new();
//!         ports.insert("in".into(), port_ref(&input));
//!         ports.insert("out".into(), port_ref(&output));
//!
//!         Arc::new(Self { core: ProxelCore::new(ports), input, output })
//!     }
//! }
//!
//! #[async_trait]
//! impl Proxel for Doubler {
//!     async fn start(&self) -> Result<(), ProxelError> {
//!         while let Some(value) = self.input.get_next().await {
//!             self.output.send(2 * value).await;
//!         }
//!         Ok(())
//!     }
//!
//!     fn stop(&self) {
//!         self.core.request_stop();
//!     }
//!
//!     fn core(&self) -> &ProxelCore {
//!         &self.core
//!     }
//!
//!     fn as_any(&self) -> &dyn Any { self }
//!     fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> { self }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut graph = Graph::new();
//!     graph.add("doubler", Doubler::new())?;
//!     graph.start(true, Some(Graph::tracing_reporter()))?;
//!     superflow::utils::wait_for_shutdown_signal().await?;
//!     graph.stop().await;
//!     Ok(())
//! }
//! ```

pub mod config; // property-list adapters
pub mod engine; // graph container + builders
pub mod errors; // error handling
pub mod ports; // typed port family
pub mod queue; // backpressure-aware queues
pub mod traits; // unified abstractions
pub mod utils; // support utilities
