//! Database access layer.
//!
//! This module provides the backend side of the proxy:
//! - Connection pools per node and the factory that builds them
//! - Data source assembly for a whole configuration
//! - Server version probing
//! - Per-schema transaction engines

pub mod assembler;
pub mod pool;
pub mod server_info;
pub mod transaction;

pub use assembler::{DataSourceAssembler, NodePools, SchemaDataSourceMap, close_data_sources};
pub use pool::{DbPool, PoolFactory, PoolHandle, SqlxPoolFactory};
pub use server_info::{ServerInfoProbe, SqlxServerInfoProbe};
pub use transaction::{
    DbTransaction, LocalTransactionEngine, LocalTransactionEngineFactory,
    TransactionEngineFactory, TransactionManagerEngine,
};
