// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors raised by the [`PropertyList`](crate::traits::PropertyList)
/// configuration contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
    /// The requested key is absent from the property list.
    #[error("could not find key \"{key}\" in property list")]
    MissingKey { key: String },

    /// The key exists but its value cannot convert to the requested type.
    #[error("type mismatch for key \"{key}\": {reason}")]
    TypeMismatch { key: String, reason: String },

    /// The value handed to a property list adapter is not a key/value map.
    #[error("property list input must be a key/value map")]
    NotAMap,
}
