// SPDX-License-Identifier: MIT

//! Backpressure-aware queue primitives.
//!
//! [`BoundedQueue`] is a single-lane FIFO with a configurable
//! [`OverflowPolicy`]; [`KeyedMultiQueue`] maps producer identities to their
//! own bounded lanes with aggregate peek/pop operations. Both cooperate with
//! a termination signal that wakes every waiter, after which all operations
//! fail with [`QueueError::Terminated`](crate::errors::QueueError).
//!
//! [`QueueReader`] and [`KeyedQueueReader`] layer the pull strategies
//! ([`ReadMode`]) that consumer ports expose.

pub mod bounded;
pub mod keyed;
pub mod reader;

pub use bounded::{BoundedQueue, OverflowPolicy};
pub use keyed::KeyedMultiQueue;
pub use reader::{KeyedQueueReader, QueueReader, ReadMode};
