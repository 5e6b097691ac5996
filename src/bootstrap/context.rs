//! The published proxy context.
//!
//! Downstream subsystems read schema and transaction contexts through
//! [`ProxyContext::snapshot`]. Both halves are published together as one
//! immutable snapshot, so a reader sees either the whole pair or nothing.

use super::{SchemaContexts, TransactionContexts};
use crate::error::{ProxyError, ProxyResult};
use crate::models::DatabaseServerInfo;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Schema contexts paired with the transaction contexts built from them.
#[derive(Debug)]
pub struct ContextSnapshot {
    schema_contexts: SchemaContexts,
    transaction_contexts: TransactionContexts,
}

impl ContextSnapshot {
    pub fn new(schema_contexts: SchemaContexts, transaction_contexts: TransactionContexts) -> Self {
        Self {
            schema_contexts,
            transaction_contexts,
        }
    }

    pub fn schema_contexts(&self) -> &SchemaContexts {
        &self.schema_contexts
    }

    pub fn transaction_contexts(&self) -> &TransactionContexts {
        &self.transaction_contexts
    }

    /// Close transaction engines, then pools.
    pub async fn close(&self) {
        self.transaction_contexts.close().await;
        self.schema_contexts.close().await;
    }
}

/// Boot-once holder of the published snapshot.
#[derive(Debug, Default)]
pub struct ProxyContext {
    published: RwLock<Option<Arc<ContextSnapshot>>>,
    server_info: RwLock<Option<DatabaseServerInfo>>,
    statement_tracing: AtomicBool,
}

impl ProxyContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The published snapshot, if boot got that far.
    pub fn snapshot(&self) -> Option<Arc<ContextSnapshot>> {
        self.published.read().clone()
    }

    pub fn is_published(&self) -> bool {
        self.published.read().is_some()
    }

    /// Publish a snapshot. A context accepts exactly one snapshot.
    pub fn publish(&self, snapshot: Arc<ContextSnapshot>) -> ProxyResult<()> {
        let mut published = self.published.write();
        if published.is_some() {
            return Err(ProxyError::publish("a proxy context is already published"));
        }
        info!(
            stage = "publish",
            schemas = snapshot.schema_contexts().len(),
            engines = snapshot.transaction_contexts().len(),
            dialect = %snapshot.schema_contexts().dialect().tag,
            database_type = %snapshot.schema_contexts().database_type(),
            "Proxy context published"
        );
        *published = Some(snapshot);
        Ok(())
    }

    /// Record what the server-info probe found.
    pub fn record_server_info(&self, info: DatabaseServerInfo) {
        *self.server_info.write() = Some(info);
    }

    pub fn server_info(&self) -> Option<DatabaseServerInfo> {
        self.server_info.read().clone()
    }

    /// Record whether statement tracing ended up enabled.
    pub fn record_statement_tracing(&self, enabled: bool) {
        self.statement_tracing.store(enabled, Ordering::Release);
    }

    pub fn statement_tracing(&self) -> bool {
        self.statement_tracing.load(Ordering::Acquire)
    }

    /// Server version advertised to protocol clients, once probed.
    pub fn advertised_server_version(&self) -> Option<String> {
        self.server_info
            .read()
            .as_ref()
            .map(DatabaseServerInfo::advertised_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Authentication;
    use crate::bootstrap::SchemaContextBuilder;
    use crate::db::SchemaDataSourceMap;
    use crate::dialect::{AdapterRegistry, ResolvedDialect};
    use crate::models::{ConfigurationProperties, DatabaseType, RuleConfiguration};

    fn empty_snapshot() -> Arc<ContextSnapshot> {
        let registry = AdapterRegistry::with_builtin_dialects();
        let schema_contexts = SchemaContextBuilder::new(&registry)
            .build(
                ResolvedDialect::family(DatabaseType::MySQL),
                SchemaDataSourceMap::new(),
                &RuleConfiguration::new(),
                Authentication::new(),
                ConfigurationProperties::default(),
            )
            .unwrap();
        Arc::new(ContextSnapshot::new(
            schema_contexts,
            TransactionContexts::new(),
        ))
    }

    #[test]
    fn test_empty_until_published() {
        let context = ProxyContext::new();
        assert!(context.snapshot().is_none());
        assert!(!context.is_published());

        context.publish(empty_snapshot()).unwrap();
        assert!(context.is_published());
        assert_eq!(
            context.snapshot().unwrap().schema_contexts().database_type(),
            DatabaseType::MySQL
        );
    }

    #[test]
    fn test_second_publish_rejected() {
        let context = ProxyContext::new();
        let first = empty_snapshot();
        context.publish(first.clone()).unwrap();

        let err = context.publish(empty_snapshot()).unwrap_err();
        assert!(matches!(err, ProxyError::Publish { .. }));
        assert!(Arc::ptr_eq(&context.snapshot().unwrap(), &first));
    }

    #[test]
    fn test_server_info() {
        let context = ProxyContext::new();
        assert!(context.advertised_server_version().is_none());

        context.record_server_info(DatabaseServerInfo::from_raw(DatabaseType::MySQL, "8.0.33"));
        let advertised = context.advertised_server_version().unwrap();
        assert!(advertised.starts_with("8.0.33-DbProxy "));
    }

    #[test]
    fn test_concurrent_readers_see_whole_pair() {
        let context = Arc::new(ProxyContext::new());
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let context = context.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        if let Some(snapshot) = context.snapshot() {
                            assert_eq!(
                                snapshot.schema_contexts().len(),
                                snapshot.transaction_contexts().len()
                            );
                        }
                    }
                })
            })
            .collect();

        context.publish(empty_snapshot()).unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert!(context.is_published());
    }
}
