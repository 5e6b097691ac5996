//! Per-schema transaction manager engines.
//!
//! Every schema gets its own engine, created by a [`TransactionEngineFactory`]
//! and initialized against the schema's pools. The default engine runs local
//! transactions on sqlx connections, or prepares one XA data source per node
//! when the proxy runs in XA mode.

use super::{DbPool, NodePools};
use crate::dialect::{AdapterRegistry, ResolvedDialect, XaDataSource};
use crate::error::{ProxyError, ProxyResult};
use crate::models::{ConfigurationProperties, TransactionType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use sqlx::{MySql, Postgres, Sqlite, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Transaction engine bound to one schema.
#[async_trait]
pub trait TransactionManagerEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Prepare the engine for the schema's pools.
    async fn init(
        &mut self,
        dialect: &ResolvedDialect,
        pools: &NodePools,
        props: &ConfigurationProperties,
    ) -> ProxyResult<()>;

    /// Release everything the engine holds. Active transactions are rolled back.
    async fn close(&self);

    fn transaction_type(&self) -> TransactionType {
        TransactionType::Local
    }

    /// Transaction manager coordinating XA branches, if any.
    fn xa_transaction_manager(&self) -> Option<&str> {
        None
    }

    async fn active_count(&self) -> usize {
        0
    }

    /// Begin a transaction on a node and return its id.
    async fn begin(&self, node: &str) -> ProxyResult<String> {
        Err(ProxyError::transaction(
            format!("Engine '{}' cannot begin transactions", self.name()),
            node,
        ))
    }

    async fn commit(&self, transaction_id: &str) -> ProxyResult<()> {
        Err(ProxyError::transaction(
            "Transaction not found",
            transaction_id,
        ))
    }

    async fn rollback(&self, transaction_id: &str) -> ProxyResult<()> {
        Err(ProxyError::transaction(
            "Transaction not found",
            transaction_id,
        ))
    }
}

/// Creates uninitialized engines, one per schema.
pub trait TransactionEngineFactory: Send + Sync {
    fn create(&self) -> Box<dyn TransactionManagerEngine>;
}

/// Database-specific transaction wrapper.
pub enum DbTransaction {
    MySql(Transaction<'static, MySql>),
    Postgres(Transaction<'static, Postgres>),
    SQLite(Transaction<'static, Sqlite>),
}

impl DbTransaction {
    /// Begin a transaction on a pool.
    pub async fn begin(pool: &DbPool) -> ProxyResult<Self> {
        Ok(match pool {
            DbPool::MySql(pool) => DbTransaction::MySql(pool.begin().await?),
            DbPool::Postgres(pool) => DbTransaction::Postgres(pool.begin().await?),
            DbPool::SQLite(pool) => DbTransaction::SQLite(pool.begin().await?),
        })
    }

    /// Commit the transaction.
    pub async fn commit(self) -> ProxyResult<()> {
        match self {
            DbTransaction::MySql(tx) => tx.commit().await.map_err(ProxyError::from),
            DbTransaction::Postgres(tx) => tx.commit().await.map_err(ProxyError::from),
            DbTransaction::SQLite(tx) => tx.commit().await.map_err(ProxyError::from),
        }
    }

    /// Rollback the transaction.
    pub async fn rollback(self) -> ProxyResult<()> {
        match self {
            DbTransaction::MySql(tx) => tx.rollback().await.map_err(ProxyError::from),
            DbTransaction::Postgres(tx) => tx.rollback().await.map_err(ProxyError::from),
            DbTransaction::SQLite(tx) => tx.rollback().await.map_err(ProxyError::from),
        }
    }
}

struct ActiveTransaction {
    transaction: DbTransaction,
    node: String,
    started_at: DateTime<Utc>,
}

/// Default engine: local sqlx transactions, or XA data sources in XA mode.
pub struct LocalTransactionEngine {
    registry: Arc<AdapterRegistry>,
    transaction_type: TransactionType,
    pools: NodePools,
    xa_manager: Option<String>,
    xa_data_sources: IndexMap<String, XaDataSource>,
    transactions: RwLock<HashMap<String, ActiveTransaction>>,
}

impl LocalTransactionEngine {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self {
            registry,
            transaction_type: TransactionType::Local,
            pools: NodePools::new(),
            xa_manager: None,
            xa_data_sources: IndexMap::new(),
            transactions: RwLock::new(HashMap::new()),
        }
    }

    /// XA data source definitions, one per node (empty in LOCAL mode).
    pub fn xa_data_sources(&self) -> &IndexMap<String, XaDataSource> {
        &self.xa_data_sources
    }

    async fn take(&self, transaction_id: &str) -> ProxyResult<ActiveTransaction> {
        let mut txs = self.transactions.write().await;
        txs.remove(transaction_id)
            .ok_or_else(|| ProxyError::transaction("Transaction not found", transaction_id))
    }
}

#[async_trait]
impl TransactionManagerEngine for LocalTransactionEngine {
    fn name(&self) -> &str {
        match self.transaction_type {
            TransactionType::Local => "local",
            TransactionType::Xa => "xa",
        }
    }

    async fn init(
        &mut self,
        dialect: &ResolvedDialect,
        pools: &NodePools,
        props: &ConfigurationProperties,
    ) -> ProxyResult<()> {
        self.transaction_type = props.transaction_type();
        self.pools = pools.clone();

        if self.transaction_type == TransactionType::Xa {
            let manager = props.xa_transaction_manager_type();
            info!(dialect = %dialect.tag, xa_manager = %manager, "Preparing XA data sources");
            self.xa_manager = Some(manager.to_string());

            if !pools.is_empty() {
                let adapter = self.registry.resolve_by_tag(&dialect.tag)?;
                for (node, handle) in pools {
                    let xa = adapter.build_xa_data_source(handle.parameters())?;
                    debug!(node = %node, xa_driver = %xa.xa_driver, "XA data source prepared");
                    self.xa_data_sources.insert(node.clone(), xa);
                }
            }
        }
        Ok(())
    }

    async fn close(&self) {
        let drained: Vec<(String, ActiveTransaction)> = {
            let mut txs = self.transactions.write().await;
            txs.drain().collect()
        };
        for (id, entry) in drained {
            warn!(
                transaction_id = %id,
                node = %entry.node,
                open_ms = elapsed_ms(entry.started_at),
                "Rolling back transaction on engine close"
            );
            if let Err(e) = entry.transaction.rollback().await {
                warn!(transaction_id = %id, error = %e, "Rollback failed");
            }
        }
    }

    fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    fn xa_transaction_manager(&self) -> Option<&str> {
        self.xa_manager.as_deref()
    }

    async fn active_count(&self) -> usize {
        self.transactions.read().await.len()
    }

    async fn begin(&self, node: &str) -> ProxyResult<String> {
        if self.transaction_type == TransactionType::Xa {
            return Err(ProxyError::transaction(
                "XA transactions are driven by the transaction coordinator",
                node,
            ));
        }
        let handle = self
            .pools
            .get(node)
            .ok_or_else(|| ProxyError::transaction(format!("Unknown node '{}'", node), node))?;

        let transaction = DbTransaction::begin(handle.pool()).await?;
        let transaction_id = generate_transaction_id();
        {
            let mut txs = self.transactions.write().await;
            txs.insert(
                transaction_id.clone(),
                ActiveTransaction {
                    transaction,
                    node: node.to_string(),
                    started_at: Utc::now(),
                },
            );
        }

        info!(transaction_id = %transaction_id, node = %node, "Transaction started");
        Ok(transaction_id)
    }

    async fn commit(&self, transaction_id: &str) -> ProxyResult<()> {
        let entry = self.take(transaction_id).await?;
        entry.transaction.commit().await?;
        info!(
            transaction_id = %transaction_id,
            node = %entry.node,
            duration_ms = elapsed_ms(entry.started_at),
            "Transaction committed"
        );
        Ok(())
    }

    async fn rollback(&self, transaction_id: &str) -> ProxyResult<()> {
        let entry = self.take(transaction_id).await?;
        entry.transaction.rollback().await?;
        info!(
            transaction_id = %transaction_id,
            node = %entry.node,
            duration_ms = elapsed_ms(entry.started_at),
            "Transaction rolled back"
        );
        Ok(())
    }
}

/// Factory for [`LocalTransactionEngine`].
#[derive(Debug, Clone)]
pub struct LocalTransactionEngineFactory {
    registry: Arc<AdapterRegistry>,
}

impl LocalTransactionEngineFactory {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self { registry }
    }
}

impl TransactionEngineFactory for LocalTransactionEngineFactory {
    fn create(&self) -> Box<dyn TransactionManagerEngine> {
        Box::new(LocalTransactionEngine::new(self.registry.clone()))
    }
}

fn elapsed_ms(started_at: DateTime<Utc>) -> i64 {
    (Utc::now() - started_at).num_milliseconds()
}

/// Generate a unique transaction ID.
fn generate_transaction_id() -> String {
    format!("tx_{}", uuid::Uuid::new_v4().simple())
}
