//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use db_proxy::bootstrap::{
    Collaborators, ContextDecorator, ContextSnapshot, ProxyContext, QueryTracing,
    SchemaContexts, TracingIntegration, TransactionContexts,
};
use db_proxy::config::{RawProxyConfiguration, StandardConfigSwapper};
use db_proxy::db::{
    DbPool, LocalTransactionEngineFactory, PoolFactory, PoolHandle, ServerInfoProbe,
};
use db_proxy::dialect::AdapterRegistry;
use db_proxy::error::{ProxyError, ProxyResult};
use db_proxy::models::{ConnectionParameters, DatabaseServerInfo, DatabaseType};
use db_proxy::transport::Listener;
use parking_lot::Mutex;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Hands out lazy in-memory SQLite pools whatever the URL; fails for URLs
/// containing "unreachable".
#[derive(Default)]
pub struct LazySqliteFactory {
    pub built: Mutex<Vec<PoolHandle>>,
}

impl LazySqliteFactory {
    pub fn built_nodes(&self) -> Vec<String> {
        self.built
            .lock()
            .iter()
            .map(|handle| handle.node().to_string())
            .collect()
    }

    pub fn all_closed(&self) -> bool {
        self.built.lock().iter().all(PoolHandle::is_closed)
    }
}

#[async_trait]
impl PoolFactory for LazySqliteFactory {
    async fn build(
        &self,
        node: &str,
        parameters: &ConnectionParameters,
    ) -> ProxyResult<PoolHandle> {
        if parameters.url.contains("unreachable") {
            return Err(ProxyError::connection(
                "Failed to connect: Connection refused",
                "Check that the server is running",
            ));
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_lazy("sqlite::memory:")?;
        let handle = PoolHandle::new(node, parameters.clone(), DbPool::SQLite(pool));
        self.built.lock().push(handle.clone());
        Ok(handle)
    }
}

/// Records the port it was started on and returns immediately.
#[derive(Default)]
pub struct RecordingListener {
    pub started: Mutex<Vec<u16>>,
    pub context: Mutex<Option<Arc<ProxyContext>>>,
}

#[async_trait]
impl Listener for RecordingListener {
    async fn start(&self, port: u16, context: Arc<ProxyContext>) -> ProxyResult<()> {
        self.started.lock().push(port);
        *self.context.lock() = Some(context);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Probe returning a fixed version, or failing.
pub struct StubProbe {
    pub version: Option<&'static str>,
    pub calls: AtomicUsize,
}

impl StubProbe {
    pub fn returning(version: &'static str) -> Self {
        Self {
            version: Some(version),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            version: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerInfoProbe for StubProbe {
    async fn probe(&self, handle: &PoolHandle) -> ProxyResult<DatabaseServerInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.version {
            Some(version) => Ok(DatabaseServerInfo::from_raw(DatabaseType::MySQL, version)),
            None => Err(ProxyError::diagnostic_probe(format!(
                "node '{}' did not answer",
                handle.node()
            ))),
        }
    }
}

/// Tracing integration that always fails.
#[derive(Default)]
pub struct BrokenTracing {
    pub attempts: AtomicUsize,
}

impl TracingIntegration for BrokenTracing {
    fn enable(&self) -> ProxyResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ProxyError::tracing_init("no exporter configured"))
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Decorator that rejects schema contexts.
pub struct RejectingDecorator;

impl ContextDecorator for RejectingDecorator {
    fn name(&self) -> &str {
        "rejecting"
    }

    fn decorate_schema_contexts(&self, _contexts: SchemaContexts) -> ProxyResult<SchemaContexts> {
        Err(ProxyError::internal("schema contexts rejected"))
    }
}

/// Decorator that publishes the contexts it is handed into `target`
/// before the boot sequence gets to.
#[derive(Default)]
pub struct PublishingDecorator {
    pub target: Mutex<Option<Arc<ProxyContext>>>,
}

impl ContextDecorator for PublishingDecorator {
    fn name(&self) -> &str {
        "publishing"
    }

    fn decorate_schema_contexts(&self, contexts: SchemaContexts) -> ProxyResult<SchemaContexts> {
        if let Some(target) = self.target.lock().as_ref() {
            target.publish(Arc::new(ContextSnapshot::new(
                contexts.clone(),
                TransactionContexts::new(),
            )))?;
        }
        Ok(contexts)
    }
}

/// Wired-up collaborators with handles on every double.
pub struct Harness {
    pub factory: Arc<LazySqliteFactory>,
    pub listener: Arc<RecordingListener>,
    pub probe: Arc<StubProbe>,
    pub tracing: Arc<QueryTracing>,
    pub collaborators: Collaborators,
}

impl Harness {
    pub fn new(registry: AdapterRegistry) -> Self {
        let registry = Arc::new(registry);
        let factory = Arc::new(LazySqliteFactory::default());
        let listener = Arc::new(RecordingListener::default());
        let probe = Arc::new(StubProbe::returning("8.0.33"));
        let tracing = Arc::new(QueryTracing::new());
        let collaborators = Collaborators {
            config_swapper: Arc::new(StandardConfigSwapper),
            transaction_engine_factory: Arc::new(LocalTransactionEngineFactory::new(
                registry.clone(),
            )),
            registry,
            pool_factory: factory.clone(),
            decorators: Vec::new(),
            tracing: tracing.clone(),
            server_info_probe: probe.clone(),
            listener: listener.clone(),
        };
        Self {
            factory,
            listener,
            probe,
            tracing,
            collaborators,
        }
    }

    pub fn with_builtin_dialects() -> Self {
        Self::new(AdapterRegistry::with_builtin_dialects())
    }
}

pub fn raw(json: &str) -> RawProxyConfiguration {
    RawProxyConfiguration::from_json_str(json).expect("valid test configuration")
}
