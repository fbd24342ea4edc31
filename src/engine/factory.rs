// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::errors::{BuildError, ProxelError};
use crate::traits::Proxel;

/// A function creating a new proxel from its configuration properties.
pub type Factory<P> = Arc<dyn Fn(&P) -> Result<Arc<dyn Proxel>, ProxelError> + Send + Sync>;

/// Registry mapping a proxel type name to its [`Factory`].
pub struct FactoryMap<P> {
    factories: BTreeMap<String, Factory<P>>,
}

impl<P> FactoryMap<P> {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register a factory under `type_name`, replacing any previous one.
    pub fn insert(
        &mut self,
        type_name: impl Into<String>,
        factory: impl Fn(&P) -> Result<Arc<dyn Proxel>, ProxelError> + Send + Sync + 'static,
    ) {
        self.factories.insert(type_name.into(), Arc::new(factory));
    }

    /// Look up the factory for a proxel type.
    pub fn get(&self, type_name: &str) -> Result<&Factory<P>, BuildError> {
        self.factories
            .get(type_name)
            .ok_or_else(|| BuildError::UnknownProxelType {
                type_name: type_name.to_string(),
            })
    }

    /// Concatenate two maps. Entries already present keep their factory.
    pub fn merge(mut self, other: FactoryMap<P>) -> FactoryMap<P> {
        for (type_name, factory) in other.factories {
            self.factories.entry(type_name).or_insert(factory);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }
}

impl<P> Default for FactoryMap<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for one proxel instance: a graph-unique id, the factory
/// type name and the opaque property bag handed to the factory.
#[derive(Debug, Clone)]
pub struct ProxelConfig<P> {
    pub id: String,
    pub type_name: String,
    pub properties: P,
}

/// A wiring instruction: connect `lhs_proxel.lhs_port` to
/// `rhs_proxel.rhs_port`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionSpec {
    pub lhs_proxel: String,
    pub lhs_port: String,
    pub rhs_proxel: String,
    pub rhs_port: String,
}

impl ConnectionSpec {
    pub fn new(
        lhs_proxel: impl Into<String>,
        lhs_port: impl Into<String>,
        rhs_proxel: impl Into<String>,
        rhs_port: impl Into<String>,
    ) -> Self {
        Self {
            lhs_proxel: lhs_proxel.into(),
            lhs_port: lhs_port.into(),
            rhs_proxel: rhs_proxel.into(),
            rhs_port: rhs_port.into(),
        }
    }
}
