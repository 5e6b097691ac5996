//! Configuration handling for the database proxy.
//!
//! Process settings come from CLI arguments and environment variables. The
//! proxy topology (schemas, data sources, rules, users, properties) comes from
//! a JSON configuration file and is normalized by a [`ConfigSwapper`].

use crate::auth::Authentication;
use crate::error::{ProxyError, ProxyResult};
use crate::models::{
    ConfigurationProperties, ConnectionParameters, DatabaseType, NodeParameters, RuleConfiguration,
    SchemaParameters, SchemaRules,
};
use clap::Parser;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PROXY_PORT: u16 = 3307;

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Connection pool configuration options for one data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 10 for MySQL/PostgreSQL, 1 for SQLite)
    #[serde(default)]
    pub max_connections: Option<u32>,
    /// Minimum connections in pool (default: 1)
    #[serde(default)]
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 600)
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    #[serde(default)]
    pub acquire_timeout_secs: Option<u64>,
    /// Whether to test connections before use (default: true)
    #[serde(default)]
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    /// Get max_connections with default value based on database type.
    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_connections.unwrap_or(if is_sqlite {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    /// Get min_connections with default value.
    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    /// Get idle_timeout with default value.
    pub fn idle_timeout_or_default(&self) -> u64 {
        self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS)
    }

    /// Get acquire_timeout with default value.
    pub fn acquire_timeout_or_default(&self) -> u64 {
        self.acquire_timeout_secs
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS)
    }

    /// Get test_before_acquire with default value.
    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Fill unset options from another set.
    pub fn or(self, fallback: PoolOptions) -> PoolOptions {
        PoolOptions {
            max_connections: self.max_connections.or(fallback.max_connections),
            min_connections: self.min_connections.or(fallback.min_connections),
            idle_timeout_secs: self.idle_timeout_secs.or(fallback.idle_timeout_secs),
            acquire_timeout_secs: self.acquire_timeout_secs.or(fallback.acquire_timeout_secs),
            test_before_acquire: self.test_before_acquire.or(fallback.test_before_acquire),
        }
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err("max_connections must be greater than 0".to_string());
            }
        }
        if let Some(min) = self.min_connections {
            if min == 0 {
                return Err("min_connections must be greater than 0".to_string());
            }
            if let Some(max) = self.max_connections {
                if min > max {
                    return Err(format!(
                        "min_connections ({}) cannot exceed max_connections ({})",
                        min, max
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Pool option keys that we extract from URL query parameters.
const POOL_OPTION_KEYS: &[&str] = &[
    "max_connections",
    "min_connections",
    "idle_timeout",
    "acquire_timeout",
    "test_before_acquire",
];

/// Split pool options out of a data source URL, keeping other query
/// parameters for the driver.
///
/// URLs that do not parse as absolute URLs (e.g. `sqlite::memory:`) are
/// returned unchanged.
pub fn extract_url_pool_options(url_str: &str) -> (String, PoolOptions) {
    let Ok(mut url) = Url::parse(url_str) else {
        return (url_str.to_string(), PoolOptions::default());
    };
    if url.query().is_none() {
        return (url_str.to_string(), PoolOptions::default());
    }
    let mut opts = extract_options(&mut url, POOL_OPTION_KEYS);
    (url.to_string(), parse_pool_options(&mut opts))
}

/// Parse pool options from extracted URL query parameters.
fn parse_pool_options(opts: &mut HashMap<String, String>) -> PoolOptions {
    PoolOptions {
        max_connections: opts.remove("max_connections").and_then(|v| v.parse().ok()),
        min_connections: opts.remove("min_connections").and_then(|v| v.parse().ok()),
        idle_timeout_secs: opts.remove("idle_timeout").and_then(|v| v.parse().ok()),
        acquire_timeout_secs: opts.remove("acquire_timeout").and_then(|v| v.parse().ok()),
        test_before_acquire: opts.remove("test_before_acquire").and_then(|v| {
            if v.eq_ignore_ascii_case("true") {
                Some(true)
            } else if v.eq_ignore_ascii_case("false") {
                Some(false)
            } else {
                None // Invalid value ignored
            }
        }),
    }
}

/// Extract proxy-specific options from URL query params, keeping others for the driver.
/// Uses proper URL encoding to preserve special characters in remaining params.
fn extract_options(url: &mut Url, keys: &[&str]) -> HashMap<String, String> {
    let mut opts = HashMap::new();
    let remaining: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(k, v)| {
            let key_lower = k.to_ascii_lowercase();
            if keys.contains(&key_lower.as_str()) {
                opts.insert(key_lower, v.into_owned());
                None
            } else {
                Some((k.into_owned(), v.into_owned()))
            }
        })
        .collect();

    if remaining.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(remaining);
    }
    opts
}

/// One data source as written in the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDataSource {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(flatten)]
    pub pool: PoolOptions,
}

/// Proxy configuration as read from the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawProxyConfiguration {
    /// Schema name -> data source name -> data source
    #[serde(default)]
    pub schema_data_sources: IndexMap<String, IndexMap<String, RawDataSource>>,
    #[serde(default)]
    pub schema_rules: IndexMap<String, SchemaRules>,
    #[serde(default)]
    pub authentication: Authentication,
    #[serde(default)]
    pub props: IndexMap<String, String>,
}

impl RawProxyConfiguration {
    /// Parse a configuration from JSON text.
    pub fn from_json_str(json: &str) -> ProxyResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ProxyError::config(format!("Invalid proxy configuration: {e}")))
    }

    /// Read a configuration file.
    pub fn from_file(path: &Path) -> ProxyResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!(
                "Cannot read configuration file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json_str(&json)
    }
}

/// Normalized proxy configuration consumed by the bootstrap.
#[derive(Debug, Clone, Default)]
pub struct ProxyConfiguration {
    pub schema_data_sources: SchemaParameters,
    pub schema_rules: RuleConfiguration,
    pub authentication: Authentication,
    pub props: ConfigurationProperties,
}

/// Turns a raw configuration into a normalized one.
pub trait ConfigSwapper: Send + Sync {
    fn swap(&self, raw: RawProxyConfiguration) -> ProxyResult<ProxyConfiguration>;
}

/// Default swapper: validates data sources, lifts pool options out of URLs
/// and types the property bag.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardConfigSwapper;

impl ConfigSwapper for StandardConfigSwapper {
    fn swap(&self, raw: RawProxyConfiguration) -> ProxyResult<ProxyConfiguration> {
        let mut schema_data_sources = SchemaParameters::with_capacity(raw.schema_data_sources.len());
        for (schema, data_sources) in raw.schema_data_sources {
            if schema.trim().is_empty() {
                return Err(ProxyError::config("Schema name cannot be empty"));
            }
            let mut nodes = NodeParameters::with_capacity(data_sources.len());
            for (node, data_source) in data_sources {
                let params = swap_data_source(&schema, &node, data_source)?;
                nodes.insert(node, params);
            }
            schema_data_sources.insert(schema, nodes);
        }

        let mut schema_rules = RuleConfiguration::new();
        for (schema, rules) in raw.schema_rules {
            schema_rules.insert(schema, rules);
        }

        raw.authentication
            .validate()
            .map_err(ProxyError::config)?;
        let props = ConfigurationProperties::from_raw(&raw.props)?;

        Ok(ProxyConfiguration {
            schema_data_sources,
            schema_rules,
            authentication: raw.authentication,
            props,
        })
    }
}

fn swap_data_source(
    schema: &str,
    node: &str,
    data_source: RawDataSource,
) -> ProxyResult<ConnectionParameters> {
    if node.trim().is_empty() {
        return Err(ProxyError::config(format!(
            "Data source name cannot be empty in schema '{}'",
            schema
        )));
    }
    if data_source.url.trim().is_empty() {
        return Err(ProxyError::config(format!(
            "Data source '{}' in schema '{}' has no url",
            node, schema
        )));
    }

    let (url, url_pool) = extract_url_pool_options(data_source.url.trim());
    let pool = data_source.pool.or(url_pool);
    pool.validate().map_err(|e| {
        ProxyError::config(format!(
            "Data source '{}' in schema '{}': {}",
            node, schema, e
        ))
    })?;

    Ok(ConnectionParameters {
        url,
        username: data_source.username,
        password: data_source.password,
        pool_options: pool,
    })
}

/// Process configuration for the database proxy.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "db-proxy",
    about = "Database proxy - fronts heterogeneous SQL backends under one schema view",
    version,
    author
)]
pub struct Config {
    /// Proxy configuration file (JSON). Without it the proxy boots with no schemas.
    #[arg(short, long = "config", value_name = "FILE", env = "PROXY_CONFIG")]
    pub config_path: Option<PathBuf>,

    /// Port the proxy listener binds to
    #[arg(short, long, default_value_t = DEFAULT_PROXY_PORT, env = "PROXY_PORT")]
    pub port: u16,

    /// Host the proxy listener binds to
    #[arg(long, default_value = DEFAULT_HOST, env = "PROXY_HOST")]
    pub host: String,

    /// Trunk database type used when no data source is configured
    #[arg(
        long,
        default_value = "mysql",
        env = "PROXY_DEFAULT_DATABASE_TYPE"
    )]
    pub default_database_type: DatabaseType,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "PROXY_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "PROXY_JSON_LOGS")]
    pub json_logs: bool,

    /// Seconds to wait for open listener connections on shutdown
    #[arg(long, default_value_t = 30, env = "PROXY_SHUTDOWN_TIMEOUT")]
    pub shutdown_timeout: u64,
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            config_path: None,
            port: DEFAULT_PROXY_PORT,
            host: DEFAULT_HOST.to_string(),
            default_database_type: DatabaseType::default(),
            log_level: "info".to_string(),
            json_logs: false,
            shutdown_timeout: 30,
        }
    }

    /// Load the raw proxy configuration, or an empty one when no file is set.
    pub fn load_proxy_configuration(&self) -> ProxyResult<RawProxyConfiguration> {
        match &self.config_path {
            Some(path) => RawProxyConfiguration::from_file(path),
            None => Ok(RawProxyConfiguration::default()),
        }
    }

    /// Get the listener bind address.
    pub fn bind_addr(&self, port: u16) -> String {
        format!("{}:{}", self.host, port)
    }

    /// Get the shutdown timeout as a Duration.
    pub fn shutdown_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, DEFAULT_PROXY_PORT);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.default_database_type, DatabaseType::MySQL);
        assert!(config.config_path.is_none());
    }

    #[test]
    fn test_cli_parsing() {
        let config = Config::try_parse_from([
            "db-proxy",
            "--config",
            "proxy.json",
            "--port",
            "4000",
            "--default-database-type",
            "postgresql",
        ])
        .unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.default_database_type, DatabaseType::PostgreSQL);
        assert_eq!(config.bind_addr(config.port), "127.0.0.1:4000");
    }

    #[test]
    fn test_load_without_file_is_empty() {
        let raw = Config::default().load_proxy_configuration().unwrap();
        assert!(raw.schema_data_sources.is_empty());
    }

    // =========================================================================
    // Pool Options Tests
    // =========================================================================

    #[test]
    fn test_pool_options_defaults() {
        let opts = PoolOptions::default();
        assert_eq!(opts.max_connections_or_default(false), 10);
        assert_eq!(opts.max_connections_or_default(true), 1);
        assert_eq!(opts.min_connections_or_default(), 1);
        assert_eq!(opts.idle_timeout_or_default(), 600);
        assert_eq!(opts.acquire_timeout_or_default(), 30);
        assert!(opts.test_before_acquire_or_default());
    }

    #[test]
    fn test_pool_options_validation() {
        let zero_max = PoolOptions {
            max_connections: Some(0),
            ..Default::default()
        };
        assert!(zero_max.validate().unwrap_err().contains("max_connections"));

        let min_over_max = PoolOptions {
            max_connections: Some(5),
            min_connections: Some(10),
            ..Default::default()
        };
        assert!(min_over_max.validate().unwrap_err().contains("cannot exceed"));
    }

    #[test]
    fn test_url_pool_options_extracted() {
        let (url, opts) = extract_url_pool_options(
            "mysql://host/db?max_connections=20&charset=utf8&idle_timeout=300",
        );
        assert_eq!(opts.max_connections, Some(20));
        assert_eq!(opts.idle_timeout_secs, Some(300));
        assert_eq!(url, "mysql://host/db?charset=utf8");
    }

    #[test]
    fn test_url_without_query_untouched() {
        let (url, opts) = extract_url_pool_options("sqlite::memory:");
        assert_eq!(url, "sqlite::memory:");
        assert_eq!(opts, PoolOptions::default());
    }

    #[test]
    fn test_url_invalid_boolean_ignored() {
        let (_, opts) = extract_url_pool_options("mysql://host/db?test_before_acquire=yes");
        assert!(opts.test_before_acquire.is_none());
    }

    // =========================================================================
    // Swapper Tests
    // =========================================================================

    const SAMPLE: &str = r#"{
        "schema_data_sources": {
            "sharding_db": {
                "ds_1": { "url": "mysql://h1/db1?max_connections=8", "username": "root", "password": "pw" },
                "ds_0": { "url": "mysql://h0/db0", "max_connections": 4 }
            },
            "analytics": {
                "pg": { "url": "postgres://h2/stats" }
            }
        },
        "schema_rules": {
            "sharding_db": { "tables": [{ "logic_table": "t_order", "actual_data_nodes": ["ds_0.t_order_0"] }] }
        },
        "authentication": { "users": { "root": { "password": "root" } } },
        "props": { "proxy-opentracing-enabled": "true" }
    }"#;

    #[test]
    fn test_swap_preserves_order() {
        let raw = RawProxyConfiguration::from_json_str(SAMPLE).unwrap();
        let config = StandardConfigSwapper.swap(raw).unwrap();
        let schemas: Vec<_> = config.schema_data_sources.keys().cloned().collect();
        assert_eq!(schemas, vec!["sharding_db", "analytics"]);
        let nodes: Vec<_> = config.schema_data_sources["sharding_db"]
            .keys()
            .cloned()
            .collect();
        assert_eq!(nodes, vec!["ds_1", "ds_0"]);
    }

    #[test]
    fn test_swap_normalizes_data_sources() {
        let raw = RawProxyConfiguration::from_json_str(SAMPLE).unwrap();
        let config = StandardConfigSwapper.swap(raw).unwrap();
        let ds_1 = &config.schema_data_sources["sharding_db"]["ds_1"];
        assert_eq!(ds_1.url, "mysql://h1/db1");
        assert_eq!(ds_1.pool_options.max_connections, Some(8));
        assert_eq!(ds_1.username.as_deref(), Some("root"));
        let ds_0 = &config.schema_data_sources["sharding_db"]["ds_0"];
        assert_eq!(ds_0.pool_options.max_connections, Some(4));
        assert!(config.props.opentracing_enabled());
        assert!(config.authentication.verify("root", "root").is_some());
        assert_eq!(config.schema_rules.len(), 1);
    }

    #[test]
    fn test_explicit_pool_option_beats_url() {
        let raw = RawProxyConfiguration::from_json_str(
            r#"{ "schema_data_sources": { "s": { "n": { "url": "mysql://h/d?max_connections=8", "max_connections": 2 } } } }"#,
        )
        .unwrap();
        let config = StandardConfigSwapper.swap(raw).unwrap();
        assert_eq!(
            config.schema_data_sources["s"]["n"].pool_options.max_connections,
            Some(2)
        );
    }

    #[test]
    fn test_swap_rejects_missing_url() {
        let raw = RawProxyConfiguration::from_json_str(
            r#"{ "schema_data_sources": { "s1": { "n1": { "url": "  " } } } }"#,
        )
        .unwrap();
        let err = StandardConfigSwapper.swap(raw).unwrap_err();
        assert!(matches!(err, ProxyError::ConfigTransform { .. }));
        assert!(err.to_string().contains("n1"));
    }

    #[test]
    fn test_swap_rejects_invalid_pool() {
        let raw = RawProxyConfiguration::from_json_str(
            r#"{ "schema_data_sources": { "s1": { "n1": { "url": "mysql://h/d", "min_connections": 0 } } } }"#,
        )
        .unwrap();
        assert!(StandardConfigSwapper.swap(raw).is_err());
    }

    #[test]
    fn test_swap_rejects_invalid_props() {
        let raw = RawProxyConfiguration::from_json_str(
            r#"{ "props": { "proxy-opentracing-enabled": "maybe" } }"#,
        )
        .unwrap();
        assert!(StandardConfigSwapper.swap(raw).is_err());
    }

    #[test]
    fn test_invalid_json() {
        let err = RawProxyConfiguration::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ProxyError::ConfigTransform { .. }));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let raw = RawProxyConfiguration::from_file(file.path()).unwrap();
        assert_eq!(raw.schema_data_sources.len(), 2);
    }

    #[test]
    fn test_from_missing_file() {
        let result = RawProxyConfiguration::from_file(Path::new("/nonexistent/proxy.json"));
        assert!(matches!(result, Err(ProxyError::ConfigTransform { .. })));
    }
}
