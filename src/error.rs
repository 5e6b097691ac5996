//! Error types for the database proxy.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Boot errors carry the identifiers (stage, schema, node, dialect tag) needed to
//! diagnose a misconfiguration without re-running the proxy.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Configuration error: {message}")]
    ConfigTransform { message: String },

    #[error("Dialect adapter '{tag}' is already registered")]
    DuplicateTag { tag: String },

    #[error("No dialect adapter recognizes URL: {url}")]
    NoMatchingAdapter {
        /// Masked URL (credentials removed)
        url: String,
    },

    #[error("Unknown dialect adapter: {tag}")]
    UnknownAdapter { tag: String },

    #[error("Failed to build data source '{node}' in schema '{schema}': {cause}")]
    DataSourceBuild {
        schema: String,
        node: String,
        cause: String,
    },

    #[error("Schema '{schema}' is referenced by rules but has no data sources")]
    SchemaMismatch { schema: String },

    #[error("Failed to initialize transaction engine for schema '{schema}': {cause}")]
    TransactionEngineInit { schema: String, cause: String },

    #[error("Failed to publish proxy context: {message}")]
    Publish { message: String },

    #[error("Server info probe failed: {message}")]
    DiagnosticProbe { message: String },

    #[error("Tracing initialization failed: {message}")]
    TracingInit { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Transaction error: {message} (transaction: {transaction_id})")]
    Transaction {
        message: String,
        transaction_id: String,
    },

    #[error("Listener error: {message}")]
    Listener { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ProxyError {
    /// Create a configuration transform error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigTransform {
            message: message.into(),
        }
    }

    /// Create a duplicate adapter tag error.
    pub fn duplicate_tag(tag: impl Into<String>) -> Self {
        Self::DuplicateTag { tag: tag.into() }
    }

    /// Create a no matching adapter error. The URL should already be masked.
    pub fn no_matching_adapter(url: impl Into<String>) -> Self {
        Self::NoMatchingAdapter { url: url.into() }
    }

    /// Create an unknown adapter error.
    pub fn unknown_adapter(tag: impl Into<String>) -> Self {
        Self::UnknownAdapter { tag: tag.into() }
    }

    /// Create a data source build error for one node.
    pub fn data_source_build(
        schema: impl Into<String>,
        node: impl Into<String>,
        cause: impl std::fmt::Display,
    ) -> Self {
        Self::DataSourceBuild {
            schema: schema.into(),
            node: node.into(),
            cause: cause.to_string(),
        }
    }

    /// Create a schema mismatch error.
    pub fn schema_mismatch(schema: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            schema: schema.into(),
        }
    }

    /// Create a transaction engine initialization error.
    pub fn transaction_engine_init(
        schema: impl Into<String>,
        cause: impl std::fmt::Display,
    ) -> Self {
        Self::TransactionEngineInit {
            schema: schema.into(),
            cause: cause.to_string(),
        }
    }

    /// Create a publish error.
    pub fn publish(message: impl Into<String>) -> Self {
        Self::Publish {
            message: message.into(),
        }
    }

    /// Create a diagnostic probe error.
    pub fn diagnostic_probe(message: impl Into<String>) -> Self {
        Self::DiagnosticProbe {
            message: message.into(),
        }
    }

    /// Create a tracing initialization error.
    pub fn tracing_init(message: impl Into<String>) -> Self {
        Self::TracingInit {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            transaction_id: transaction_id.into(),
        }
    }

    /// Create a listener error.
    pub fn listener(message: impl Into<String>) -> Self {
        Self::Listener {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::NoMatchingAdapter { .. } => {
                Some("Register a dialect adapter for this URL scheme or fix the URL")
            }
            Self::SchemaMismatch { .. } => {
                Some("Add data sources for the schema or remove its rules")
            }
            _ => None,
        }
    }

    /// The boot stage this error belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::ConfigTransform { .. } => "config",
            Self::DuplicateTag { .. }
            | Self::NoMatchingAdapter { .. }
            | Self::UnknownAdapter { .. } => "dialect",
            Self::DataSourceBuild { .. } | Self::Connection { .. } => "datasource",
            Self::SchemaMismatch { .. } => "schema",
            Self::TransactionEngineInit { .. } | Self::Transaction { .. } => "transaction",
            Self::Publish { .. } => "publish",
            Self::TracingInit { .. } => "tracing",
            Self::DiagnosticProbe { .. } => "server-info",
            Self::Listener { .. } => "listener",
            Self::Internal { .. } => "internal",
        }
    }

    /// Whether this error must abort boot.
    ///
    /// Tracing and server-info failures only affect diagnostics.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::DiagnosticProbe { .. } | Self::TracingInit { .. })
    }
}

/// Convert sqlx errors to ProxyError.
impl From<sqlx::Error> for ProxyError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => ProxyError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => ProxyError::internal(match db_err.code() {
                Some(code) => format!("{} (SQLSTATE: {})", db_err.message(), code),
                None => db_err.message().to_string(),
            }),
            sqlx::Error::PoolTimedOut => ProxyError::connection(
                "Timed out acquiring a connection from the pool",
                "Increase acquire_timeout or max_connections",
            ),
            sqlx::Error::PoolClosed => {
                ProxyError::connection("Connection pool is closed", "Restart the proxy")
            }
            sqlx::Error::Io(io_err) => ProxyError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => ProxyError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => ProxyError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::WorkerCrashed => ProxyError::internal("Database worker crashed"),
            _ => ProxyError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProxyError::data_source_build("sales", "ds_0", "connection refused");
        let msg = err.to_string();
        assert!(msg.contains("sales"));
        assert!(msg.contains("ds_0"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = ProxyError::connection("refused", "Check the server");
        assert_eq!(err.suggestion(), Some("Check the server"));
        assert!(ProxyError::internal("x").suggestion().is_none());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ProxyError::config("bad").is_fatal());
        assert!(ProxyError::schema_mismatch("s2").is_fatal());
        assert!(ProxyError::publish("twice").is_fatal());
        assert!(!ProxyError::diagnostic_probe("down").is_fatal());
        assert!(!ProxyError::tracing_init("no exporter").is_fatal());
    }

    #[test]
    fn test_stage_labels() {
        assert_eq!(ProxyError::no_matching_adapter("x://h").stage(), "dialect");
        assert_eq!(
            ProxyError::data_source_build("s", "n", "boom").stage(),
            "datasource"
        );
        assert_eq!(
            ProxyError::transaction_engine_init("s", "boom").stage(),
            "transaction"
        );
    }

    #[test]
    fn test_pool_closed_maps_to_connection() {
        let err: ProxyError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, ProxyError::Connection { .. }));
    }
}
