//! Typed configuration properties.
//!
//! Properties arrive as a flat string bag. Known keys are validated and
//! typed when the bag is converted; unknown keys are preserved untouched.

use crate::error::{ProxyError, ProxyResult};
use indexmap::IndexMap;
use serde::Serialize;

/// Transaction type used by the per-schema transaction engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    #[default]
    Local,
    Xa,
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOCAL" => Ok(Self::Local),
            "XA" => Ok(Self::Xa),
            other => Err(format!("Unknown transaction type: {other}")),
        }
    }
}

/// Property value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Bool,
    Int,
    Text,
    TransactionType,
}

/// Known configuration property keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    ProxyOpentracingEnabled,
    SqlShow,
    ProxyFrontendFlushThreshold,
    MaxConnectionsSizePerQuery,
    XaTransactionManagerType,
    ProxyTransactionType,
    ProxyFetchDriver,
}

impl PropertyKey {
    pub const ALL: [PropertyKey; 7] = [
        PropertyKey::ProxyOpentracingEnabled,
        PropertyKey::SqlShow,
        PropertyKey::ProxyFrontendFlushThreshold,
        PropertyKey::MaxConnectionsSizePerQuery,
        PropertyKey::XaTransactionManagerType,
        PropertyKey::ProxyTransactionType,
        PropertyKey::ProxyFetchDriver,
    ];

    /// Key as written in configuration files.
    pub fn key(&self) -> &'static str {
        match self {
            Self::ProxyOpentracingEnabled => "proxy-opentracing-enabled",
            Self::SqlShow => "sql-show",
            Self::ProxyFrontendFlushThreshold => "proxy-frontend-flush-threshold",
            Self::MaxConnectionsSizePerQuery => "max-connections-size-per-query",
            Self::XaTransactionManagerType => "xa-transaction-manager-type",
            Self::ProxyTransactionType => "proxy-transaction-type",
            Self::ProxyFetchDriver => "proxy-fetch-driver",
        }
    }

    pub fn default_value(&self) -> &'static str {
        match self {
            Self::ProxyOpentracingEnabled => "false",
            Self::SqlShow => "false",
            Self::ProxyFrontendFlushThreshold => "128",
            Self::MaxConnectionsSizePerQuery => "1",
            Self::XaTransactionManagerType => "Atomikos",
            Self::ProxyTransactionType => "LOCAL",
            Self::ProxyFetchDriver => "sqlx",
        }
    }

    fn kind(&self) -> ValueKind {
        match self {
            Self::ProxyOpentracingEnabled | Self::SqlShow => ValueKind::Bool,
            Self::ProxyFrontendFlushThreshold | Self::MaxConnectionsSizePerQuery => ValueKind::Int,
            Self::XaTransactionManagerType | Self::ProxyFetchDriver => ValueKind::Text,
            Self::ProxyTransactionType => ValueKind::TransactionType,
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let normalized = key.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL.into_iter().find(|k| k.key() == normalized)
    }
}

/// Validated property bag.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigurationProperties {
    values: IndexMap<String, String>,
}

impl ConfigurationProperties {
    /// Build typed properties from raw key/value pairs.
    ///
    /// Known keys are normalized and validated against their value kind.
    pub fn from_raw(raw: &IndexMap<String, String>) -> ProxyResult<Self> {
        let mut values = IndexMap::with_capacity(raw.len());
        for (key, value) in raw {
            match PropertyKey::from_key(key) {
                Some(known) => {
                    validate(known, value)?;
                    values.insert(known.key().to_string(), value.trim().to_string());
                }
                None => {
                    values.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(Self { values })
    }

    fn raw_value(&self, key: PropertyKey) -> &str {
        self.values
            .get(key.key())
            .map(String::as_str)
            .unwrap_or_else(|| key.default_value())
    }

    /// Boolean property value (validated at construction).
    pub fn get_bool(&self, key: PropertyKey) -> bool {
        self.raw_value(key).eq_ignore_ascii_case("true")
    }

    /// Integer property value (validated at construction).
    pub fn get_int(&self, key: PropertyKey) -> u32 {
        self.raw_value(key)
            .parse()
            .or_else(|_| key.default_value().parse())
            .unwrap_or_default()
    }

    /// Text property value.
    pub fn get_text(&self, key: PropertyKey) -> &str {
        self.raw_value(key)
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.raw_value(PropertyKey::ProxyTransactionType)
            .parse()
            .unwrap_or_default()
    }

    pub fn opentracing_enabled(&self) -> bool {
        self.get_bool(PropertyKey::ProxyOpentracingEnabled)
    }

    pub fn sql_show(&self) -> bool {
        self.get_bool(PropertyKey::SqlShow)
    }

    pub fn frontend_flush_threshold(&self) -> u32 {
        self.get_int(PropertyKey::ProxyFrontendFlushThreshold)
    }

    pub fn max_connections_size_per_query(&self) -> u32 {
        self.get_int(PropertyKey::MaxConnectionsSizePerQuery)
    }

    /// Transaction manager recorded on XA engines.
    pub fn xa_transaction_manager_type(&self) -> &str {
        self.get_text(PropertyKey::XaTransactionManagerType)
    }

    /// Driver tag the fetch-size policy is chosen for.
    pub fn fetch_driver(&self) -> &str {
        self.get_text(PropertyKey::ProxyFetchDriver)
    }

    /// Lookup of any key, known or not, as configured.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn validate(key: PropertyKey, value: &str) -> ProxyResult<()> {
    let value = value.trim();
    let valid = match key.kind() {
        ValueKind::Bool => {
            value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false")
        }
        ValueKind::Int => value.parse::<u32>().is_ok(),
        ValueKind::Text => !value.is_empty(),
        ValueKind::TransactionType => value.parse::<TransactionType>().is_ok(),
    };
    if valid {
        Ok(())
    } else {
        Err(ProxyError::config(format!(
            "Invalid value '{}' for property '{}'",
            value,
            key.key()
        )))
    }
}
