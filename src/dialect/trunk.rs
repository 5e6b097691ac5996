//! Trunk database type resolution.

use super::AdapterRegistry;
use crate::error::ProxyResult;
use crate::models::{DatabaseType, SchemaParameters};
use tracing::{debug, info};

/// The dialect chosen for a configuration and the trunk type it maps to.
///
/// `tag` names the adapter that recognized the sample node, so per-dialect
/// strategies (XA data sources, fetch size) dispatch to that adapter even
/// when it delegates its trunk type to another one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDialect {
    pub tag: String,
    pub trunk: DatabaseType,
}

impl ResolvedDialect {
    /// The built-in dialect of a trunk family.
    pub fn family(trunk: DatabaseType) -> Self {
        Self {
            tag: trunk.display_name().to_string(),
            trunk,
        }
    }
}

/// Resolve the dialect and trunk database type for a whole configuration.
///
/// The first node of the first schema decides the dialect. With no schemas,
/// or a first schema without nodes, the family dialect of `default` is used.
pub fn resolve_trunk_type(
    schemas: &SchemaParameters,
    registry: &AdapterRegistry,
    default: DatabaseType,
) -> ProxyResult<ResolvedDialect> {
    let sample = schemas
        .first()
        .and_then(|(schema, nodes)| nodes.first().map(|(node, params)| (schema, node, params)));

    let Some((schema, node, params)) = sample else {
        info!(database_type = %default, "No data sources configured, using default trunk type");
        return Ok(ResolvedDialect::family(default));
    };

    let dialect = registry.resolve_dialect(&params.url)?;
    debug!(
        schema = %schema,
        node = %node,
        dialect = %dialect.tag,
        database_type = %dialect.trunk,
        "Resolved trunk database type"
    );
    Ok(dialect)
}
