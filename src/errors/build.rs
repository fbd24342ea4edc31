// SPDX-License-Identifier: MIT

use thiserror::Error;

use super::{PropertyError, ProxelError};

/// Errors raised by [`Graph`](crate::engine::Graph) lookups, wiring and
/// lifecycle transitions.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GraphError {
    /// No proxel with the given id exists in the graph.
    #[error("proxel '{id}' does not exist")]
    ProxelNotFound { id: String },

    /// The proxel exists but is not of the requested concrete type.
    #[error("proxel '{id}' is not of the requested type")]
    WrongProxelType { id: String },

    /// The proxel has no port with the given name.
    #[error("port '{port}' does not exist on proxel '{proxel}'")]
    PortNotFound { proxel: String, port: String },

    /// A proxel id was reused within the graph.
    #[error("proxel '{id}' does already exist")]
    DuplicateProxel { id: String },

    /// A connection names the same proxel on both sides.
    #[error("loop detected trying to connect '{id}' to itself")]
    SelfConnection { id: String },

    /// `start` was called while workers are already running.
    #[error("cannot start graph when workers are running")]
    AlreadyRunning,

    /// Wiring two named ports failed; the message names all four components.
    #[error("connect {lhs_proxel}.{lhs_port} -> {rhs_proxel}.{rhs_port} failed: {source}")]
    Connection {
        lhs_proxel: String,
        lhs_port: String,
        rhs_proxel: String,
        rhs_port: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Errors raised while materialising a graph from configuration.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BuildError {
    /// A proxel id appears in more than one configuration entry.
    #[error("proxel with id '{id}' is defined more than once")]
    DuplicateProxel { id: String },

    /// No factory is registered under the configured type name.
    #[error("no factory registered for proxel type '{type_name}'")]
    UnknownProxelType { type_name: String },

    /// The factory for the given proxel id failed.
    #[error("failed to create proxel '{id}': {source}")]
    Factory {
        id: String,
        #[source]
        source: ProxelError,
    },

    /// Fan-out expansion produced incompatible side sizes.
    #[error("attempted connecting {lhs_count} ports on '{lhs}' to {rhs_count} ports on '{rhs}'")]
    ConnectionArityMismatch {
        lhs: String,
        lhs_count: usize,
        rhs: String,
        rhs_count: usize,
    },

    /// A connection endpoint on a replicated proxel lists several ports;
    /// one replica per port is ambiguous.
    #[error("ambiguous port list on replicated proxel '{id}'")]
    AmbiguousPortList { id: String },

    /// A connection endpoint names no ports at all.
    #[error("connection endpoint on '{id}' names no ports")]
    EmptyPortList { id: String },

    /// A `$`-prefixed replica property must hold one entry per replica.
    #[error(
        "replica property '{key}' on '{id}' must be a list with {expected} entries, found {actual}"
    )]
    ReplicaProperty {
        id: String,
        key: String,
        expected: usize,
        actual: usize,
    },

    /// Wiring the built graph failed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A property conversion failed while expanding the plan.
    #[error(transparent)]
    Property(#[from] PropertyError),
}
