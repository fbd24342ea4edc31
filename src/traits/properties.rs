// SPDX-License-Identifier: MIT

use serde::de::DeserializeOwned;

use crate::errors::PropertyError;

/// The configuration contract consumed by proxel factories.
///
/// A property list is an opaque key/value bag supplied by an external
/// configuration collaborator. Adapters for concrete formats implement key
/// lookup and typed conversion; [`get_or`](Self::get_or) layers the common
/// default-on-absence behaviour on top. Conversion failures on a present key
/// are always reported, even when a default is supplied.
pub trait PropertyList {
    /// Whether the given key exists.
    fn has_key(&self, key: &str) -> bool;

    /// Retrieve and convert the value stored under `key`.
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, PropertyError>;

    /// As [`get`](Self::get), but return `default` if the key is absent.
    fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, PropertyError> {
        if self.has_key(key) {
            self.get(key)
        } else {
            Ok(default)
        }
    }
}
