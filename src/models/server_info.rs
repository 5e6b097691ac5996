//! Backend server information gathered at boot.

use crate::models::DatabaseType;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Name the proxy advertises after the backend version.
pub const PROXY_SERVER_NAME: &str = "DbProxy";

/// Version and identity of the backend behind the sample data source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseServerInfo {
    pub database_type: DatabaseType,
    /// Parsed version, e.g. "8.0.33"
    pub version: String,
    /// Raw version string as returned by the server
    pub raw: String,
    pub probed_at: DateTime<Utc>,
}

impl DatabaseServerInfo {
    /// Build server info from the raw version string of a backend.
    pub fn from_raw(database_type: DatabaseType, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let version = parse_version(database_type, &raw);
        Self {
            database_type,
            version,
            raw,
            probed_at: Utc::now(),
        }
    }

    /// Server version string advertised to clients over the wire protocol.
    pub fn advertised_version(&self) -> String {
        format!(
            "{}-{} {}",
            self.version,
            PROXY_SERVER_NAME,
            env!("CARGO_PKG_VERSION")
        )
    }
}

impl std::fmt::Display for DatabaseServerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Database type is `{}`, version is `{}`",
            self.database_type, self.version
        )
    }
}

/// PostgreSQL reports "PostgreSQL 15.3 on x86_64-pc-linux-gnu, ...".
fn parse_version(database_type: DatabaseType, raw: &str) -> String {
    let trimmed = raw.trim();
    match database_type {
        DatabaseType::PostgreSQL => trimmed
            .strip_prefix("PostgreSQL ")
            .and_then(|rest| rest.split_whitespace().next())
            .map(|v| v.trim_end_matches(',').to_string())
            .unwrap_or_else(|| trimmed.to_string()),
        DatabaseType::MySQL | DatabaseType::SQLite => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_postgres_version() {
        let info = DatabaseServerInfo::from_raw(
            DatabaseType::PostgreSQL,
            "PostgreSQL 15.3 on x86_64-pc-linux-gnu, compiled by gcc",
        );
        assert_eq!(info.version, "15.3");
        assert!(info.raw.contains("x86_64"));
    }

    #[test]
    fn test_mysql_version_kept() {
        let info = DatabaseServerInfo::from_raw(DatabaseType::MySQL, "8.0.33-log\n");
        assert_eq!(info.version, "8.0.33-log");
    }

    #[test]
    fn test_advertised_version() {
        let info = DatabaseServerInfo::from_raw(DatabaseType::MySQL, "5.7.44");
        let advertised = info.advertised_version();
        assert!(advertised.starts_with("5.7.44-DbProxy "));
        assert!(advertised.ends_with(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_display() {
        let info = DatabaseServerInfo::from_raw(DatabaseType::SQLite, "3.45.1");
        assert_eq!(
            info.to_string(),
            "Database type is `SQLite`, version is `3.45.1`"
        );
    }
}
