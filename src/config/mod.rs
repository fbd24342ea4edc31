// SPDX-License-Identifier: MIT

//! Configuration adapters.
//!
//! The core consumes configuration through the
//! [`PropertyList`](crate::traits::PropertyList) contract; this module
//! provides [`JsonProperties`], the `serde_json`-backed adapter used by the
//! declarative plan layer and available to any collaborator that parses its
//! configuration into JSON values.

mod properties;

pub use properties::JsonProperties;
