// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::config::JsonProperties;
use crate::errors::BuildError;
use crate::traits::PropertyList;

use super::factory::{ConnectionSpec, FactoryMap, ProxelConfig};
use super::graph::Graph;

/// Property keys carrying this marker hold one value per replica; replica
/// `i` receives the `i`-th entry under the unmarked key.
const REPLICA_MARKER: char = '$';

fn default_enable() -> bool {
    true
}

fn default_replicate() -> usize {
    1
}

/// Declarative description of one proxel, as parsed from a configuration
/// collaborator.
///
/// A disabled proxel (`enable: false`) is not built, and connections that
/// mention it are silently dropped. A `replicate` count above one expands
/// the entry into `{id}_0 .. {id}_{n-1}`, slicing any `$`-prefixed list
/// property per replica.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxelSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default = "default_enable")]
    pub enable: bool,
    #[serde(default = "default_replicate")]
    pub replicate: usize,
    #[serde(default)]
    pub properties: JsonProperties,
}

impl ProxelSpec {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            enable: true,
            replicate: 1,
            properties: JsonProperties::new(),
        }
    }

    pub fn with_properties(mut self, properties: JsonProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enable = false;
        self
    }

    pub fn replicated(mut self, count: usize) -> Self {
        self.replicate = count;
        self
    }

    fn replica_count(&self) -> usize {
        self.replicate.max(1)
    }
}

/// One side of a declarative connection: a proxel and one or more of its
/// ports.
///
/// A multi-port list fans the connection out across those ports. On a
/// replicated proxel only a single port may be named; the connection then
/// expands across the replicas instead.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkEnd {
    pub proxel: String,
    pub ports: Vec<String>,
}

impl LinkEnd {
    pub fn single(proxel: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            proxel: proxel.into(),
            ports: vec![port.into()],
        }
    }

    pub fn spread(proxel: impl Into<String>, ports: impl IntoIterator<Item = String>) -> Self {
        Self {
            proxel: proxel.into(),
            ports: ports.into_iter().collect(),
        }
    }
}

/// A declarative connection between two [`LinkEnd`]s.
#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub from: LinkEnd,
    pub to: LinkEnd,
}

impl Link {
    pub fn new(from: LinkEnd, to: LinkEnd) -> Self {
        Self { from, to }
    }
}

/// A whole declarative graph: proxel specs plus connections.
///
/// Expansion applies replication, drops disabled proxels and their
/// connections, and fans connections out. When both sides of a link expand
/// to the same width they are zipped pairwise; a single endpoint broadcasts
/// against a wider side; anything else is an arity mismatch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphPlan {
    #[serde(default)]
    pub proxels: Vec<ProxelSpec>,
    #[serde(default)]
    pub connections: Vec<Link>,
}

impl GraphPlan {
    pub fn new(proxels: Vec<ProxelSpec>, connections: Vec<Link>) -> Self {
        Self {
            proxels,
            connections,
        }
    }

    /// Expand the plan into flat configuration lists for
    /// [`build_graph`](super::build_graph).
    pub fn expand(
        &self,
    ) -> Result<(Vec<ProxelConfig<JsonProperties>>, Vec<ConnectionSpec>), BuildError> {
        let configs = self.expand_proxels()?;
        let connections = self.expand_connections()?;
        Ok((configs, connections))
    }

    /// Expand and build in one step.
    pub fn build(&self, factories: &FactoryMap<JsonProperties>) -> Result<Graph, BuildError> {
        let (configs, connections) = self.expand()?;
        super::builder::build_graph(factories, &configs, &connections)
    }

    /// Combine two plans, concatenating their proxels and connections.
    ///
    /// Lets a configuration be scattered across several files or sections
    /// and aggregated before expansion.
    pub fn merge(mut self, other: GraphPlan) -> GraphPlan {
        self.proxels.extend(other.proxels);
        self.connections.extend(other.connections);
        self
    }

    /// Ids of all enabled proxels (after replica expansion) whose `flag`
    /// property is set to true.
    pub fn flagged_proxels(&self, flag: &str) -> Result<Vec<String>, BuildError> {
        let mut flagged = Vec::new();

        for config in self.expand_proxels()? {
            if config.properties.get_or(flag, false)? {
                flagged.push(config.id);
            }
        }

        Ok(flagged)
    }

    fn expand_proxels(&self) -> Result<Vec<ProxelConfig<JsonProperties>>, BuildError> {
        let mut configs = Vec::new();

        for spec in self.proxels.iter().filter(|spec| spec.enable) {
            let replicas = spec.replica_count();

            if replicas == 1 {
                configs.push(ProxelConfig {
                    id: spec.id.clone(),
                    type_name: spec.type_name.clone(),
                    properties: spec.properties.clone(),
                });
                continue;
            }

            for index in 0..replicas {
                configs.push(ProxelConfig {
                    id: replica_id(&spec.id, index),
                    type_name: spec.type_name.clone(),
                    properties: slice_replica_properties(spec, index, replicas)?,
                });
            }
        }

        Ok(configs)
    }

    fn expand_connections(&self) -> Result<Vec<ConnectionSpec>, BuildError> {
        let enabled: BTreeMap<&str, usize> = self
            .proxels
            .iter()
            .filter(|spec| spec.enable)
            .map(|spec| (spec.id.as_str(), spec.replica_count()))
            .collect();

        let mut connections = Vec::new();

        for link in &self.connections {
            let (Some(&from_replicas), Some(&to_replicas)) = (
                enabled.get(link.from.proxel.as_str()),
                enabled.get(link.to.proxel.as_str()),
            ) else {
                // One side is disabled or unknown to the plan; the link is
                // dropped silently.
                continue;
            };

            let mut from = expand_end(&link.from, from_replicas)?;
            let mut to = expand_end(&link.to, to_replicas)?;

            if from.len() != to.len() && from.len() != 1 && to.len() != 1 {
                return Err(BuildError::ConnectionArityMismatch {
                    lhs: link.from.proxel.clone(),
                    lhs_count: from.len(),
                    rhs: link.to.proxel.clone(),
                    rhs_count: to.len(),
                });
            }

            broadcast_to(&mut from, to.len());
            broadcast_to(&mut to, from.len());

            for ((lhs_proxel, lhs_port), (rhs_proxel, rhs_port)) in from.into_iter().zip(to) {
                connections.push(ConnectionSpec {
                    lhs_proxel,
                    lhs_port,
                    rhs_proxel,
                    rhs_port,
                });
            }
        }

        Ok(connections)
    }
}

fn replica_id(base: &str, index: usize) -> String {
    format!("{base}_{index}")
}

/// Resolve `$`-marked list properties to the entry for one replica.
fn slice_replica_properties(
    spec: &ProxelSpec,
    index: usize,
    replicas: usize,
) -> Result<JsonProperties, BuildError> {
    let mut properties = spec.properties.clone();

    let marked: Vec<String> = spec
        .properties
        .values()
        .keys()
        .filter(|key| key.starts_with(REPLICA_MARKER))
        .cloned()
        .collect();

    for key in marked {
        let Some(Value::Array(entries)) = properties.remove(&key) else {
            return Err(BuildError::ReplicaProperty {
                id: spec.id.clone(),
                key,
                expected: replicas,
                actual: 0,
            });
        };

        if entries.len() != replicas {
            return Err(BuildError::ReplicaProperty {
                id: spec.id.clone(),
                key,
                expected: replicas,
                actual: entries.len(),
            });
        }

        let value = entries[index].clone();
        properties.insert(key[REPLICA_MARKER.len_utf8()..].to_string(), value);
    }

    Ok(properties)
}

/// Expand one side of a link into `(proxel id, port)` pairs.
fn expand_end(end: &LinkEnd, replicas: usize) -> Result<Vec<(String, String)>, BuildError> {
    let Some(first_port) = end.ports.first() else {
        return Err(BuildError::EmptyPortList {
            id: end.proxel.clone(),
        });
    };

    if replicas > 1 {
        if end.ports.len() > 1 {
            return Err(BuildError::AmbiguousPortList {
                id: end.proxel.clone(),
            });
        }

        return Ok((0..replicas)
            .map(|index| (replica_id(&end.proxel, index), first_port.clone()))
            .collect());
    }

    Ok(end
        .ports
        .iter()
        .map(|port| (end.proxel.clone(), port.clone()))
        .collect())
}

fn broadcast_to(side: &mut Vec<(String, String)>, width: usize) {
    if side.len() == 1 && width > 1 {
        let only = side[0].clone();
        side.resize(width, only);
    }
}
