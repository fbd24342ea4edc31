// SPDX-License-Identifier: MIT

//! Error types for the superflow runtime.
//!
//! Errors are split by subsystem: [`QueueError`] for the queue primitives,
//! [`PortError`] for port wiring and transfer, [`GraphError`] for graph
//! lookups and lifecycle, [`BuildError`] for the declarative builder and
//! [`PropertyError`] for the configuration contract. [`ProxelError`] is the
//! failure value a crashed proxel hands to the graph; crash reporters receive
//! it as a value so it can be inspected rather than flattened to a string.

mod build;
mod properties;

pub use build::{BuildError, GraphError};
pub use properties::PropertyError;

use thiserror::Error;

use crate::queue::ReadMode;

/// Errors raised by the bounded and keyed queues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Queue capacity must be at least one element.
    #[error("queue capacity must be 1 or more")]
    ZeroCapacity,

    /// The seed contents passed at construction exceed the capacity.
    #[error("seeded {len} items into a queue of capacity {capacity}")]
    SeedOverflow { len: usize, capacity: usize },

    /// The queue has been terminated; all further operations fail.
    ///
    /// Readers treat this as end-of-stream.
    #[error("queue is terminated")]
    Terminated,
}

/// Errors raised when wiring or using ports.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PortError {
    /// The peer port's value type is not compatible with this port's type,
    /// including its registered variants.
    #[error("type mismatch when connecting ports")]
    TypeMismatch,

    /// Attempted to connect a second peer to a single-connection port.
    #[error("attempted connecting multiple ports to a single-connection port")]
    CardinalityViolation,

    /// The operation requires a connected peer but none is connected.
    #[error("port has no connection")]
    NotConnected,

    /// The requested read mode only applies to multi-source consumers.
    #[error("read mode {mode:?} is not supported by a single-buffer consumer")]
    UnsupportedReadMode { mode: ReadMode },

    /// The port's underlying queue rejected the operation.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// The failure value of a crashed proxel.
///
/// Produced by a proxel's `start` returning `Err`, or synthesised from a
/// panic payload caught at the worker boundary. The graph records it in the
/// crashes map and passes it to the crash reporter.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProxelError {
    pub message: String,
}

impl ProxelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<PortError> for ProxelError {
    fn from(err: PortError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<QueueError> for ProxelError {
    fn from(err: QueueError) -> Self {
        Self::new(err.to_string())
    }
}
