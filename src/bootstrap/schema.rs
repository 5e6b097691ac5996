//! Schema contexts: the immutable per-boot view of schemas, pools and rules.

use crate::auth::Authentication;
use crate::db::{NodePools, PoolHandle, SchemaDataSourceMap, close_data_sources};
use crate::dialect::{AdapterRegistry, FetchSizeRule, ResolvedDialect};
use crate::error::{ProxyError, ProxyResult};
use crate::models::{ConfigurationProperties, DatabaseType, RuleConfiguration, SchemaRules};
use indexmap::IndexMap;
use tracing::debug;

/// One logical schema with its live pools and rules.
#[derive(Debug, Clone)]
pub struct SchemaContext {
    name: String,
    data_sources: NodePools,
    rules: SchemaRules,
}

impl SchemaContext {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_sources(&self) -> &NodePools {
        &self.data_sources
    }

    pub fn data_source(&self, node: &str) -> Option<&PoolHandle> {
        self.data_sources.get(node)
    }

    pub fn rules(&self) -> &SchemaRules {
        &self.rules
    }
}

/// Snapshot of every schema, the resolved dialect, users and properties.
#[derive(Debug, Clone)]
pub struct SchemaContexts {
    dialect: ResolvedDialect,
    fetch_size: FetchSizeRule,
    schemas: IndexMap<String, SchemaContext>,
    authentication: Authentication,
    props: ConfigurationProperties,
}

impl SchemaContexts {
    /// Trunk database type.
    pub fn database_type(&self) -> DatabaseType {
        self.dialect.trunk
    }

    /// Dialect that recognized the sample node.
    pub fn dialect(&self) -> &ResolvedDialect {
        &self.dialect
    }

    /// Fetch-size rule of the dialect for the configured fetch driver.
    pub fn fetch_size(&self) -> FetchSizeRule {
        self.fetch_size
    }

    pub fn get(&self, schema: &str) -> Option<&SchemaContext> {
        self.schemas.get(schema)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &SchemaContext> {
        self.schemas.values()
    }

    pub fn schema_names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn authentication(&self) -> &Authentication {
        &self.authentication
    }

    pub fn props(&self) -> &ConfigurationProperties {
        &self.props
    }

    /// The first node of the first schema, if any.
    pub fn data_source_sample(&self) -> Option<&PoolHandle> {
        self.schemas
            .first()
            .and_then(|(_, schema)| schema.data_sources.first())
            .map(|(_, handle)| handle)
    }

    /// Schema name -> node pools, in configured order.
    pub fn data_source_map(&self) -> SchemaDataSourceMap {
        self.schemas
            .iter()
            .map(|(name, schema)| (name.clone(), schema.data_sources.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Close every pool of every schema.
    pub async fn close(&self) {
        close_data_sources(&self.data_source_map()).await;
    }
}

/// Builds [`SchemaContexts`] from assembled data sources and rules.
#[derive(Debug, Clone, Copy)]
pub struct SchemaContextBuilder<'a> {
    registry: &'a AdapterRegistry,
}

impl<'a> SchemaContextBuilder<'a> {
    pub fn new(registry: &'a AdapterRegistry) -> Self {
        Self { registry }
    }

    /// Combine pools and rules into schema contexts. Does no I/O.
    ///
    /// Every schema named by the rules must have data sources. Schemas
    /// without rules get an empty rule set.
    pub fn build(
        &self,
        dialect: ResolvedDialect,
        data_sources: SchemaDataSourceMap,
        rules: &RuleConfiguration,
        authentication: Authentication,
        props: ConfigurationProperties,
    ) -> ProxyResult<SchemaContexts> {
        if let Some(missing) = rules
            .schema_names()
            .find(|schema| !data_sources.contains_key(*schema))
        {
            return Err(ProxyError::schema_mismatch(missing));
        }

        let fetch_size = self.fetch_size(&dialect, props.fetch_driver());

        let schemas = data_sources
            .into_iter()
            .map(|(name, pools)| {
                let schema_rules = rules.get(&name).cloned().unwrap_or_default();
                debug!(
                    stage = "schema",
                    schema = %name,
                    nodes = pools.len(),
                    tables = schema_rules.tables.len(),
                    "Schema context built"
                );
                let context = SchemaContext {
                    name: name.clone(),
                    data_sources: pools,
                    rules: schema_rules,
                };
                (name, context)
            })
            .collect();

        Ok(SchemaContexts {
            dialect,
            fetch_size,
            schemas,
            authentication,
            props,
        })
    }

    /// A family dialect picked by default may have no registered adapter;
    /// the driver keeps its own fetch size then.
    fn fetch_size(&self, dialect: &ResolvedDialect, driver: &str) -> FetchSizeRule {
        self.registry
            .fetch_size_for(&dialect.tag, driver)
            .unwrap_or_else(|e| {
                debug!(dialect = %dialect.tag, error = %e, "No fetch-size policy, using driver default");
                FetchSizeRule::DriverDefault
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbPool;
    use crate::models::{ConnectionParameters, TableRule};
    use sqlx::sqlite::SqlitePoolOptions;

    fn lazy_handle(node: &str) -> PoolHandle {
        let pool = SqlitePoolOptions::new()
            .connect_lazy("sqlite::memory:")
            .unwrap();
        PoolHandle::new(
            node,
            ConnectionParameters::new("sqlite::memory:"),
            DbPool::SQLite(pool),
        )
    }

    fn data_sources(entries: &[(&str, &[&str])]) -> SchemaDataSourceMap {
        entries
            .iter()
            .map(|(schema, nodes)| {
                let pools: NodePools = nodes
                    .iter()
                    .map(|node| (node.to_string(), lazy_handle(node)))
                    .collect();
                (schema.to_string(), pools)
            })
            .collect()
    }

    fn order_rules() -> SchemaRules {
        SchemaRules {
            tables: vec![TableRule {
                logic_table: "t_order".into(),
                actual_data_nodes: vec!["n1.t_order".into()],
            }],
            default_data_source: None,
        }
    }

    fn build(
        data_sources: SchemaDataSourceMap,
        rules: &RuleConfiguration,
    ) -> ProxyResult<SchemaContexts> {
        let registry = AdapterRegistry::with_builtin_dialects();
        SchemaContextBuilder::new(&registry).build(
            ResolvedDialect::family(DatabaseType::MySQL),
            data_sources,
            rules,
            Authentication::new(),
            ConfigurationProperties::default(),
        )
    }

    fn props(pairs: &[(&str, &str)]) -> ConfigurationProperties {
        let raw: IndexMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ConfigurationProperties::from_raw(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_rules_for_missing_schema() {
        let rules = RuleConfiguration::new()
            .with_schema("s1", order_rules())
            .with_schema("s2", order_rules())
            .with_schema("s3", order_rules());
        let err = build(data_sources(&[("s1", &["n1"])]), &rules).unwrap_err();
        assert!(matches!(err, ProxyError::SchemaMismatch { schema } if schema == "s2"));
    }

    #[tokio::test]
    async fn test_schemas_without_rules_get_empty_rules() {
        let rules = RuleConfiguration::new().with_schema("s1", order_rules());
        let contexts = build(data_sources(&[("s1", &["n1"]), ("s2", &["n1"])]), &rules).unwrap();

        let names: Vec<_> = contexts.schema_names().collect();
        assert_eq!(names, vec!["s1", "s2"]);
        assert_eq!(contexts.get("s1").unwrap().rules().tables.len(), 1);
        assert!(contexts.get("s2").unwrap().rules().is_empty());
    }

    #[tokio::test]
    async fn test_data_source_sample() {
        let contexts = build(
            data_sources(&[("s1", &["n2", "n1"]), ("s2", &["n3"])]),
            &RuleConfiguration::new(),
        )
        .unwrap();
        assert_eq!(contexts.data_source_sample().unwrap().node(), "n2");

        let empty = build(data_sources(&[("s1", &[])]), &RuleConfiguration::new()).unwrap();
        assert!(empty.data_source_sample().is_none());
    }

    #[tokio::test]
    async fn test_close_closes_every_pool() {
        let contexts = build(
            data_sources(&[("s1", &["n1", "n2"])]),
            &RuleConfiguration::new(),
        )
        .unwrap();
        contexts.close().await;
        assert!(
            contexts
                .get("s1")
                .unwrap()
                .data_sources()
                .values()
                .all(PoolHandle::is_closed)
        );
    }

    #[test]
    fn test_fetch_size_follows_dialect_and_driver() {
        let registry = AdapterRegistry::with_builtin_dialects();
        let builder = SchemaContextBuilder::new(&registry);
        let postgres = ResolvedDialect::family(DatabaseType::PostgreSQL);

        let jdbc = builder
            .build(
                postgres.clone(),
                SchemaDataSourceMap::new(),
                &RuleConfiguration::new(),
                Authentication::new(),
                props(&[("proxy-fetch-driver", "jdbc")]),
            )
            .unwrap();
        assert_eq!(jdbc.fetch_size(), FetchSizeRule::Fixed(1));
        assert_eq!(jdbc.dialect().tag, "PostgreSQL");

        let sqlx = builder
            .build(
                postgres,
                SchemaDataSourceMap::new(),
                &RuleConfiguration::new(),
                Authentication::new(),
                ConfigurationProperties::default(),
            )
            .unwrap();
        assert_eq!(sqlx.fetch_size(), FetchSizeRule::Streaming);
    }

    #[test]
    fn test_unregistered_family_uses_driver_default() {
        let registry = AdapterRegistry::new();
        let contexts = SchemaContextBuilder::new(&registry)
            .build(
                ResolvedDialect::family(DatabaseType::MySQL),
                SchemaDataSourceMap::new(),
                &RuleConfiguration::new(),
                Authentication::new(),
                ConfigurationProperties::default(),
            )
            .unwrap();
        assert_eq!(contexts.fetch_size(), FetchSizeRule::DriverDefault);
        assert_eq!(contexts.database_type(), DatabaseType::MySQL);
    }
}
