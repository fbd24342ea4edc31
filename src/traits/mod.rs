// SPDX-License-Identifier: MIT

//! Unified abstractions: the [`Port`] and [`Proxel`] traits and the
//! [`PropertyList`] configuration contract.

pub mod port;
pub mod properties;
pub mod proxel;

pub use port::{
    port_ref, ErasedEndpoint, Port, PortId, PortRef, PortStatus, RespondTo, ValueReceiver,
};
pub use properties::PropertyList;
pub use proxel::{PortMap, Proxel, ProxelCore, ProxelState, ProxelStatus, ProxelStatusMap};
