//! Data models for the database proxy.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod props;
pub mod rule;
pub mod server_info;

// Re-export commonly used types
pub use connection::{
    ConnectionParameters, DatabaseType, NodeParameters, SchemaParameters, mask_url,
};
pub use props::{ConfigurationProperties, PropertyKey, TransactionType};
pub use rule::{RuleConfiguration, SchemaRules, TableRule};
pub use server_info::{DatabaseServerInfo, PROXY_SERVER_NAME};
