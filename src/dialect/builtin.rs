//! Built-in dialect adapters.

use super::{DialectAdapter, FetchSizeRule, JDBC_DRIVER, TrunkMapping, XaDataSource};
use crate::models::DatabaseType;

/// Tag of the MariaDB dialect.
pub const MARIADB: &str = "MariaDB";

/// MySQL streams row by row regardless of driver.
pub fn mysql() -> DialectAdapter {
    DialectAdapter::builder(
        DatabaseType::MySQL.display_name(),
        TrunkMapping::Native(DatabaseType::MySQL),
    )
    .url_prefixes(&["mysql://", "jdbc:mysql:"])
    .fetch_size(|_| FetchSizeRule::Streaming)
    .xa_data_source(|params| {
        Ok(
            XaDataSource::from_parameters("MySQL", "mysql-xa", DatabaseType::MySQL, params)?
                .with_property("pinGlobalTxToPhysicalConnection", "true"),
        )
    })
    .build()
}

/// MariaDB speaks the MySQL protocol and takes MySQL as its trunk type.
pub fn mariadb() -> DialectAdapter {
    DialectAdapter::builder(
        MARIADB,
        TrunkMapping::Delegate(DatabaseType::MySQL.display_name().to_string()),
    )
    .url_prefixes(&["mariadb://", "jdbc:mariadb:"])
    .fetch_size(|_| FetchSizeRule::Streaming)
    .xa_data_source(|params| {
        Ok(
            XaDataSource::from_parameters(MARIADB, "mariadb-xa", DatabaseType::MySQL, params)?
                .with_property("pinGlobalTxToPhysicalConnection", "true"),
        )
    })
    .build()
}

/// JDBC-style drivers need a one-row cursor to avoid buffering the whole
/// result; sqlx already streams.
pub fn postgresql() -> DialectAdapter {
    DialectAdapter::builder(
        DatabaseType::PostgreSQL.display_name(),
        TrunkMapping::Native(DatabaseType::PostgreSQL),
    )
    .url_prefixes(&["postgres://", "postgresql://", "jdbc:postgresql:"])
    .fetch_size(|driver| {
        if driver.eq_ignore_ascii_case(JDBC_DRIVER) {
            FetchSizeRule::Fixed(1)
        } else {
            FetchSizeRule::Streaming
        }
    })
    .xa_data_source(|params| {
        XaDataSource::from_parameters(
            "PostgreSQL",
            "postgresql-xa",
            DatabaseType::PostgreSQL,
            params,
        )
    })
    .build()
}

/// SQLite has no XA support.
pub fn sqlite() -> DialectAdapter {
    DialectAdapter::builder(
        DatabaseType::SQLite.display_name(),
        TrunkMapping::Native(DatabaseType::SQLite),
    )
    .url_prefixes(&["sqlite:", "jdbc:sqlite:"])
    .build()
}

/// All built-in adapters, most specific first.
pub fn all() -> Vec<DialectAdapter> {
    vec![mariadb(), mysql(), postgresql(), sqlite()]
}
