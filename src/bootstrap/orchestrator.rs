//! Boot sequence of the proxy.
//!
//! Stages, in order:
//! 1. swap the raw configuration into a normalized one
//! 2. resolve the trunk database type, then assemble data sources
//! 3. build and decorate schema contexts
//! 4. build and decorate transaction contexts
//! 5. publish both into the [`ProxyContext`]
//! 6. enable statement tracing when configured
//! 7. probe the sample data source for its server version
//! 8. start the listener
//!
//! Stages 1 to 5 are fatal and release whatever they opened before returning
//! the error. Stages 6 and 7 only log their failures.

use super::decorator::{decorate_schema_contexts, decorate_transaction_contexts};
use super::{
    ContextDecorator, ContextSnapshot, ProxyContext, QueryTracing, SchemaContextBuilder,
    TracingIntegration, TransactionContextBuilder,
};
use crate::config::{ConfigSwapper, RawProxyConfiguration, StandardConfigSwapper};
use crate::db::{
    DataSourceAssembler, LocalTransactionEngineFactory, PoolFactory, ServerInfoProbe,
    SqlxPoolFactory, SqlxServerInfoProbe, TransactionEngineFactory, close_data_sources,
};
use crate::dialect::{AdapterRegistry, resolve_trunk_type};
use crate::error::{ProxyError, ProxyResult};
use crate::models::DatabaseType;
use crate::transport::Listener;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Everything the boot sequence delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub config_swapper: Arc<dyn ConfigSwapper>,
    pub registry: Arc<AdapterRegistry>,
    pub pool_factory: Arc<dyn PoolFactory>,
    pub transaction_engine_factory: Arc<dyn TransactionEngineFactory>,
    pub decorators: Vec<Arc<dyn ContextDecorator>>,
    pub tracing: Arc<dyn TracingIntegration>,
    pub server_info_probe: Arc<dyn ServerInfoProbe>,
    pub listener: Arc<dyn Listener>,
}

impl Collaborators {
    /// sqlx-backed collaborators over the given registry and listener.
    pub fn standard(registry: Arc<AdapterRegistry>, listener: Arc<dyn Listener>) -> Self {
        Self {
            config_swapper: Arc::new(StandardConfigSwapper),
            transaction_engine_factory: Arc::new(LocalTransactionEngineFactory::new(
                registry.clone(),
            )),
            registry,
            pool_factory: Arc::new(SqlxPoolFactory),
            decorators: Vec::new(),
            tracing: Arc::new(QueryTracing::new()),
            server_info_probe: Arc::new(SqlxServerInfoProbe),
            listener,
        }
    }

    pub fn with_decorator(mut self, decorator: Arc<dyn ContextDecorator>) -> Self {
        self.decorators.push(decorator);
        self
    }
}

pub struct BootstrapOrchestrator {
    collaborators: Collaborators,
    default_database_type: DatabaseType,
    context: Arc<ProxyContext>,
}

impl BootstrapOrchestrator {
    pub fn new(collaborators: Collaborators, default_database_type: DatabaseType) -> Self {
        Self {
            collaborators,
            default_database_type,
            context: Arc::new(ProxyContext::new()),
        }
    }

    /// The context this orchestrator publishes into.
    pub fn context(&self) -> Arc<ProxyContext> {
        self.context.clone()
    }

    /// Boot the proxy and serve on `port` until the listener stops.
    pub async fn init(&self, raw: RawProxyConfiguration, port: u16) -> ProxyResult<()> {
        self.boot(raw).await?;

        let listener = &self.collaborators.listener;
        info!(stage = "listener", listener = %listener.name(), port, "Starting listener");
        listener.start(port, self.context.clone()).await
    }

    /// Run stages 1 to 7 and return the published snapshot.
    pub async fn boot(&self, raw: RawProxyConfiguration) -> ProxyResult<Arc<ContextSnapshot>> {
        let snapshot = self.publish_contexts(raw).await.inspect_err(|e| {
            error!(stage = %e.stage(), error = %e, "Boot aborted");
        })?;

        self.enable_tracing(&snapshot);
        self.probe_server_info(&snapshot).await;

        Ok(snapshot)
    }

    /// Stages 1 to 5.
    async fn publish_contexts(
        &self,
        raw: RawProxyConfiguration,
    ) -> ProxyResult<Arc<ContextSnapshot>> {
        let c = &self.collaborators;

        if self.context.is_published() {
            return Err(ProxyError::publish(
                "boot already completed for this context",
            ));
        }

        info!(stage = "config", "Swapping proxy configuration");
        let config = c.config_swapper.swap(raw)?;

        let dialect = resolve_trunk_type(
            &config.schema_data_sources,
            &c.registry,
            self.default_database_type,
        )?;
        info!(
            stage = "dialect",
            dialect = %dialect.tag,
            database_type = %dialect.trunk,
            "Trunk database type resolved"
        );

        let data_sources = DataSourceAssembler::new(c.pool_factory.clone())
            .assemble(&config.schema_data_sources)
            .await?;

        let schema_contexts = match SchemaContextBuilder::new(&c.registry)
            .build(
                dialect,
                data_sources.clone(),
                &config.schema_rules,
                config.authentication,
                config.props,
            )
            .and_then(|contexts| decorate_schema_contexts(&c.decorators, contexts))
        {
            Ok(contexts) => contexts,
            Err(e) => {
                close_data_sources(&data_sources).await;
                return Err(e);
            }
        };
        let props = schema_contexts.props();
        info!(
            stage = "schema",
            schemas = schema_contexts.len(),
            sql_show = props.sql_show(),
            fetch_driver = %props.fetch_driver(),
            fetch_size = %schema_contexts.fetch_size(),
            frontend_flush_threshold = props.frontend_flush_threshold(),
            max_connections_size_per_query = props.max_connections_size_per_query(),
            "Schema contexts built"
        );

        let transaction_contexts = match TransactionContextBuilder::new(
            c.transaction_engine_factory.clone(),
        )
        .build(&schema_contexts)
        .await
        {
            Ok(contexts) => contexts,
            Err(failure) => {
                failure.initialized.close().await;
                close_data_sources(&data_sources).await;
                return Err(failure.error);
            }
        };
        let transaction_contexts =
            match decorate_transaction_contexts(&c.decorators, transaction_contexts.clone()) {
                Ok(contexts) => contexts,
                Err(e) => {
                    transaction_contexts.close().await;
                    close_data_sources(&data_sources).await;
                    return Err(e);
                }
            };
        info!(
            stage = "transaction",
            engines = transaction_contexts.len(),
            "Transaction contexts built"
        );

        let snapshot = Arc::new(ContextSnapshot::new(schema_contexts, transaction_contexts));
        if let Err(e) = self.context.publish(snapshot.clone()) {
            // Closing a pool twice is a no-op. The assembled map still holds
            // pools a decorator replaced in the snapshot.
            snapshot.close().await;
            close_data_sources(&data_sources).await;
            return Err(e);
        }
        Ok(snapshot)
    }

    /// Stage 6.
    fn enable_tracing(&self, snapshot: &ContextSnapshot) {
        if !snapshot.schema_contexts().props().opentracing_enabled() {
            return;
        }
        let tracing = &self.collaborators.tracing;
        if let Err(e) = tracing.enable() {
            warn!(stage = "tracing", error = %e, "Failed to enable statement tracing");
        }
        self.context.record_statement_tracing(tracing.is_enabled());
    }

    /// Stage 7.
    async fn probe_server_info(&self, snapshot: &ContextSnapshot) {
        let Some(sample) = snapshot.schema_contexts().data_source_sample() else {
            info!(stage = "server-info", "No data source to probe");
            return;
        };

        match self.collaborators.server_info_probe.probe(sample).await {
            Ok(server_info) => {
                info!(stage = "server-info", node = %sample.node(), "{}", server_info);
                info!(
                    stage = "server-info",
                    advertised_version = %server_info.advertised_version(),
                    "Protocol server version set"
                );
                self.context.record_server_info(server_info);
            }
            Err(e) => {
                warn!(
                    stage = "server-info",
                    node = %sample.node(),
                    error = %e,
                    "Failed to probe server info"
                );
            }
        }
    }
}
