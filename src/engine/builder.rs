// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::errors::BuildError;
use crate::traits::Proxel;

use super::factory::{ConnectionSpec, FactoryMap, ProxelConfig};
use super::graph::Graph;

/// Instantiate every configured proxel through its registered factory.
///
/// Configurations are processed in order; a reused id, an unknown type name
/// or a failing factory aborts the build with an error naming the offender.
pub fn build_proxels<P>(
    factories: &FactoryMap<P>,
    configs: &[ProxelConfig<P>],
) -> Result<BTreeMap<String, Arc<dyn Proxel>>, BuildError> {
    let mut proxels: BTreeMap<String, Arc<dyn Proxel>> = BTreeMap::new();

    for config in configs {
        if proxels.contains_key(&config.id) {
            return Err(BuildError::DuplicateProxel {
                id: config.id.clone(),
            });
        }

        let factory = factories.get(&config.type_name)?;

        let proxel = factory(&config.properties).map_err(|source| BuildError::Factory {
            id: config.id.clone(),
            source,
        })?;

        debug!(id = %config.id, type_name = %config.type_name, "proxel built");
        proxels.insert(config.id.clone(), proxel);
    }

    Ok(proxels)
}

/// Materialise a wired [`Graph`] from factories, proxel configurations and
/// connection specifications.
pub fn build_graph<P>(
    factories: &FactoryMap<P>,
    configs: &[ProxelConfig<P>],
    connections: &[ConnectionSpec],
) -> Result<Graph, BuildError> {
    let graph = Graph::with_proxels(build_proxels(factories, configs)?);

    for connection in connections {
        graph.connect(
            &connection.lhs_proxel,
            &connection.lhs_port,
            &connection.rhs_proxel,
            &connection.rhs_port,
        )?;
    }

    Ok(graph)
}
