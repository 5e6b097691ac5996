//! Turns the configured node parameters into live pools.

use super::{PoolFactory, PoolHandle};
use crate::error::{ProxyError, ProxyResult};
use crate::models::SchemaParameters;
use futures_util::future::join_all;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Node name -> live pool, in configured order.
pub type NodePools = IndexMap<String, PoolHandle>;

/// Schema name -> node pools, in configured order.
pub type SchemaDataSourceMap = IndexMap<String, NodePools>;

/// Builds one pool per configured node through a [`PoolFactory`].
pub struct DataSourceAssembler {
    factory: Arc<dyn PoolFactory>,
}

impl DataSourceAssembler {
    pub fn new(factory: Arc<dyn PoolFactory>) -> Self {
        Self { factory }
    }

    /// Build every pool, schema by schema, node by node.
    ///
    /// On the first failure every pool already opened by this call is closed
    /// before the error is returned.
    pub async fn assemble(&self, schemas: &SchemaParameters) -> ProxyResult<SchemaDataSourceMap> {
        let mut assembled = SchemaDataSourceMap::with_capacity(schemas.len());

        for (schema, nodes) in schemas {
            let mut pools = NodePools::with_capacity(nodes.len());
            for (node, params) in nodes {
                debug!(stage = "datasource", schema = %schema, node = %node, "Building pool");
                match self.factory.build(node, params).await {
                    Ok(handle) => {
                        pools.insert(node.clone(), handle);
                    }
                    Err(e) => {
                        error!(
                            stage = "datasource",
                            schema = %schema,
                            node = %node,
                            url = %params.masked_url(),
                            error = %e,
                            "Failed to build pool"
                        );
                        assembled.insert(schema.clone(), pools);
                        close_data_sources(&assembled).await;
                        return Err(ProxyError::data_source_build(schema, node, e));
                    }
                }
            }
            assembled.insert(schema.clone(), pools);
        }

        info!(
            stage = "datasource",
            schemas = assembled.len(),
            pools = assembled.values().map(|nodes| nodes.len()).sum::<usize>(),
            "Data sources assembled"
        );
        Ok(assembled)
    }
}

/// Close every pool of an assembled map.
pub async fn close_data_sources(data_sources: &SchemaDataSourceMap) {
    join_all(
        data_sources
            .values()
            .flat_map(|pools| pools.values())
            .map(|handle| handle.close()),
    )
    .await;
}
