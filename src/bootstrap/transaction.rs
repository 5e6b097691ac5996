//! Transaction contexts: one initialized engine per schema.

use super::SchemaContexts;
use crate::db::{TransactionEngineFactory, TransactionManagerEngine};
use crate::error::ProxyError;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Schema name -> transaction engine, in schema order.
#[derive(Clone, Default)]
pub struct TransactionContexts {
    engines: IndexMap<String, Arc<dyn TransactionManagerEngine>>,
}

impl TransactionContexts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, schema: impl Into<String>, engine: Arc<dyn TransactionManagerEngine>) {
        self.engines.insert(schema.into(), engine);
    }

    pub fn get(&self, schema: &str) -> Option<&Arc<dyn TransactionManagerEngine>> {
        self.engines.get(schema)
    }

    pub fn schema_names(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }

    pub fn engines(&self) -> impl Iterator<Item = (&str, &Arc<dyn TransactionManagerEngine>)> {
        self.engines.iter().map(|(name, engine)| (name.as_str(), engine))
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Close every engine.
    pub async fn close(&self) {
        for (schema, engine) in &self.engines {
            debug!(schema = %schema, engine = %engine.name(), "Closing transaction engine");
            engine.close().await;
        }
    }
}

impl std::fmt::Debug for TransactionContexts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.engines.iter().map(|(k, v)| (k, v.name())))
            .finish()
    }
}

/// A failed build, with the engines initialized before the failure.
#[derive(Debug)]
pub struct TransactionBuildError {
    pub error: ProxyError,
    pub initialized: TransactionContexts,
}

impl From<TransactionBuildError> for ProxyError {
    fn from(err: TransactionBuildError) -> Self {
        err.error
    }
}

/// Creates and initializes one engine per schema.
pub struct TransactionContextBuilder {
    factory: Arc<dyn TransactionEngineFactory>,
}

impl TransactionContextBuilder {
    pub fn new(factory: Arc<dyn TransactionEngineFactory>) -> Self {
        Self { factory }
    }

    /// Build engines in schema order.
    ///
    /// On failure the engine that failed is closed; the ones initialized
    /// before it are handed back in the error for the caller to release.
    pub async fn build(
        &self,
        schema_contexts: &SchemaContexts,
    ) -> Result<TransactionContexts, TransactionBuildError> {
        let dialect = schema_contexts.dialect();
        let mut contexts = TransactionContexts::new();

        for schema in schema_contexts.schemas() {
            let mut engine = self.factory.create();
            if let Err(e) = engine
                .init(dialect, schema.data_sources(), schema_contexts.props())
                .await
            {
                error!(
                    stage = "transaction",
                    schema = %schema.name(),
                    engine = %engine.name(),
                    error = %e,
                    "Transaction engine initialization failed"
                );
                engine.close().await;
                return Err(TransactionBuildError {
                    error: ProxyError::transaction_engine_init(schema.name(), e),
                    initialized: contexts,
                });
            }
            debug!(
                stage = "transaction",
                schema = %schema.name(),
                engine = %engine.name(),
                "Transaction engine initialized"
            );
            contexts.insert(schema.name(), Arc::from(engine));
        }

        Ok(contexts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Authentication;
    use crate::bootstrap::SchemaContextBuilder;
    use crate::db::{DbPool, NodePools, PoolHandle, SchemaDataSourceMap};
    use crate::dialect::{AdapterRegistry, ResolvedDialect};
    use crate::error::ProxyResult;
    use crate::models::{
        ConfigurationProperties, ConnectionParameters, DatabaseType, RuleConfiguration,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use sqlx::sqlite::SqlitePoolOptions;

    /// Records init order; fails for the schema holding `fail_node`.
    struct ScriptedFactory {
        log: Arc<Mutex<Vec<String>>>,
        closed: Arc<Mutex<Vec<String>>>,
        fail_node: Option<&'static str>,
    }

    struct ScriptedEngine {
        log: Arc<Mutex<Vec<String>>>,
        closed: Arc<Mutex<Vec<String>>>,
        fail_node: Option<&'static str>,
        label: String,
    }

    #[async_trait]
    impl TransactionManagerEngine for ScriptedEngine {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn init(
            &mut self,
            _dialect: &ResolvedDialect,
            pools: &NodePools,
            _props: &ConfigurationProperties,
        ) -> ProxyResult<()> {
            self.label = pools.keys().cloned().collect::<Vec<_>>().join(",");
            self.log.lock().push(self.label.clone());
            if let Some(fail) = self.fail_node {
                if pools.contains_key(fail) {
                    return Err(ProxyError::internal("engine refused"));
                }
            }
            Ok(())
        }

        async fn close(&self) {
            self.closed.lock().push(self.label.clone());
        }
    }

    impl TransactionEngineFactory for ScriptedFactory {
        fn create(&self) -> Box<dyn TransactionManagerEngine> {
            Box::new(ScriptedEngine {
                log: self.log.clone(),
                closed: self.closed.clone(),
                fail_node: self.fail_node,
                label: String::new(),
            })
        }
    }

    fn factory(fail_node: Option<&'static str>) -> ScriptedFactory {
        ScriptedFactory {
            log: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(Mutex::new(Vec::new())),
            fail_node,
        }
    }

    fn schema_contexts(entries: &[(&str, &str)]) -> SchemaContexts {
        let data_sources: SchemaDataSourceMap = entries
            .iter()
            .map(|(schema, node)| {
                let pool = SqlitePoolOptions::new()
                    .connect_lazy("sqlite::memory:")
                    .unwrap();
                let mut pools = NodePools::new();
                pools.insert(
                    node.to_string(),
                    PoolHandle::new(
                        *node,
                        ConnectionParameters::new("sqlite::memory:"),
                        DbPool::SQLite(pool),
                    ),
                );
                (schema.to_string(), pools)
            })
            .collect();
        let registry = AdapterRegistry::with_builtin_dialects();
        SchemaContextBuilder::new(&registry)
            .build(
                ResolvedDialect::family(DatabaseType::SQLite),
                data_sources,
                &RuleConfiguration::new(),
                Authentication::new(),
                ConfigurationProperties::default(),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_one_engine_per_schema_in_order() {
        let factory = factory(None);
        let log = factory.log.clone();
        let builder = TransactionContextBuilder::new(Arc::new(factory));
        let contexts = schema_contexts(&[("s3", "a"), ("s1", "b"), ("s2", "c")]);

        let engines = builder.build(&contexts).await.unwrap();

        let names: Vec<_> = engines.schema_names().collect();
        assert_eq!(names, vec!["s3", "s1", "s2"]);
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failure_returns_initialized_engines() {
        let factory = factory(Some("b"));
        let closed = factory.closed.clone();
        let builder = TransactionContextBuilder::new(Arc::new(factory));
        let contexts = schema_contexts(&[("s1", "a"), ("s2", "b"), ("s3", "c")]);

        let err = builder.build(&contexts).await.unwrap_err();
        assert!(matches!(
            &err.error,
            ProxyError::TransactionEngineInit { schema, .. } if schema == "s2"
        ));
        assert_eq!(err.initialized.len(), 1);
        assert!(err.initialized.get("s1").is_some());
        // The failing engine is closed by the builder itself.
        assert_eq!(*closed.lock(), vec!["b"]);

        err.initialized.close().await;
        assert_eq!(*closed.lock(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_empty_schemas() {
        let builder = TransactionContextBuilder::new(Arc::new(factory(None)));
        let engines = builder.build(&schema_contexts(&[])).await.unwrap();
        assert!(engines.is_empty());
    }
}
