// SPDX-License-Identifier: MIT

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::PropertyError;
use crate::traits::PropertyList;

/// A [`PropertyList`] backed by a JSON object.
///
/// Typed extraction goes through serde, so any deserialisable type works:
///
/// ```
/// use serde_json::json;
/// use superflow::config::JsonProperties;
/// use superflow::traits::PropertyList;
///
/// let props = JsonProperties::from_value(json!({ "rate": 10, "tag": "aft" })).unwrap();
/// assert_eq!(props.get::<u32>("rate").unwrap(), 10);
/// assert_eq!(props.get_or("missing", 7).unwrap(), 7);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct JsonProperties {
    values: Map<String, Value>,
}

impl JsonProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, PropertyError> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            _ => Err(PropertyError::NotAMap),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }
}

impl From<Map<String, Value>> for JsonProperties {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

impl PropertyList for JsonProperties {
    fn has_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, PropertyError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| PropertyError::MissingKey {
                key: key.to_string(),
            })?;

        serde_json::from_value(value.clone()).map_err(|err| PropertyError::TypeMismatch {
            key: key.to_string(),
            reason: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_object_input_is_rejected() {
        assert_eq!(
            JsonProperties::from_value(json!([1, 2, 3])).err(),
            Some(PropertyError::NotAMap)
        );
    }

    #[test]
    fn typed_extraction_converts_values() {
        let props =
            JsonProperties::from_value(json!({ "count": 3, "name": "relay", "flag": true }))
                .unwrap();

        assert!(props.has_key("count"));
        assert_eq!(props.get::<usize>("count").unwrap(), 3);
        assert_eq!(props.get::<String>("name").unwrap(), "relay");
        assert!(props.get::<bool>("flag").unwrap());
    }

    #[test]
    fn missing_key_and_type_mismatch_are_distinct() {
        let props = JsonProperties::from_value(json!({ "count": "three" })).unwrap();

        assert!(matches!(
            props.get::<u32>("absent").unwrap_err(),
            PropertyError::MissingKey { .. }
        ));
        assert!(matches!(
            props.get::<u32>("count").unwrap_err(),
            PropertyError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn defaults_apply_only_on_absence() {
        let props = JsonProperties::from_value(json!({ "count": "three" })).unwrap();

        assert_eq!(props.get_or("absent", 9).unwrap(), 9);
        // A present-but-mismatched key still reports the conversion error.
        assert!(props.get_or("count", 9).is_err());
    }

    #[test]
    fn lists_deserialise_into_vectors() {
        let props = JsonProperties::from_value(json!({ "taps": [1, 2, 3] })).unwrap();
        assert_eq!(props.get::<Vec<i32>>("taps").unwrap(), vec![1, 2, 3]);
    }
}
