//! DB Proxy Library
//!
//! This library boots a database proxy over heterogeneous SQL backends
//! (MySQL, MariaDB, PostgreSQL, SQLite): it resolves dialects, opens one pool
//! per configured node, builds schema and transaction contexts, publishes them
//! atomically and starts the listener.

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod dialect;
pub mod error;
pub mod models;
pub mod transport;

pub use bootstrap::{BootstrapOrchestrator, Collaborators, ProxyContext};
pub use config::Config;
pub use dialect::AdapterRegistry;
pub use error::{ProxyError, ProxyResult};
