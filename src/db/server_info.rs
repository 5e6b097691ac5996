//! Backend version probe.

use super::{DbPool, PoolHandle};
use crate::error::{ProxyError, ProxyResult};
use crate::models::DatabaseServerInfo;
use async_trait::async_trait;
use tracing::debug;

/// Reads version information from a live data source.
#[async_trait]
pub trait ServerInfoProbe: Send + Sync {
    async fn probe(&self, handle: &PoolHandle) -> ProxyResult<DatabaseServerInfo>;
}

/// Probe issuing the native version query of each backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxServerInfoProbe;

#[async_trait]
impl ServerInfoProbe for SqlxServerInfoProbe {
    async fn probe(&self, handle: &PoolHandle) -> ProxyResult<DatabaseServerInfo> {
        let raw = match handle.pool() {
            DbPool::MySql(pool) => {
                sqlx::query_scalar::<_, String>("SELECT version()")
                    .fetch_one(pool)
                    .await
            }
            DbPool::Postgres(pool) => {
                sqlx::query_scalar::<_, String>("SELECT version()")
                    .fetch_one(pool)
                    .await
            }
            DbPool::SQLite(pool) => {
                sqlx::query_scalar::<_, String>("SELECT sqlite_version()")
                    .fetch_one(pool)
                    .await
            }
        }
        .map_err(|e| {
            ProxyError::diagnostic_probe(format!(
                "Cannot read server version of node '{}': {}",
                handle.node(),
                e
            ))
        })?;

        debug!(node = %handle.node(), version = %raw, "Got server version");
        Ok(DatabaseServerInfo::from_raw(handle.db_type(), raw))
    }
}
