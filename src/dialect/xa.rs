//! XA data source definitions.
//!
//! An [`XaDataSource`] describes how the distributed-transaction coordinator
//! should reach one node through the dialect's XA driver. Building one does no I/O.

use crate::error::{ProxyError, ProxyResult};
use crate::models::{ConnectionParameters, DatabaseType};
use indexmap::IndexMap;
use serde::Serialize;
use url::Url;

#[derive(Clone, Serialize)]
pub struct XaDataSource {
    /// Tag of the dialect adapter that built this definition
    pub dialect: String,
    /// XA driver identifier understood by the coordinator
    pub xa_driver: String,
    /// Masked URL, for diagnostics
    pub url: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    password: Option<String>,
    /// Driver properties, in insertion order
    pub properties: IndexMap<String, String>,
}

impl XaDataSource {
    /// Derive the standard XA properties (server name, port, database) from the node URL.
    pub fn from_parameters(
        dialect: impl Into<String>,
        xa_driver: impl Into<String>,
        family: DatabaseType,
        params: &ConnectionParameters,
    ) -> ProxyResult<Self> {
        let dialect = dialect.into();
        let url = Url::parse(params.native_url()).map_err(|e| {
            ProxyError::config(format!(
                "Cannot derive XA data source from '{}': {e}",
                params.masked_url()
            ))
        })?;
        let host = url.host_str().ok_or_else(|| {
            ProxyError::config(format!(
                "XA data source for '{}' requires a host",
                params.masked_url()
            ))
        })?;

        let mut properties = IndexMap::new();
        properties.insert("serverName".to_string(), host.to_string());
        if let Some(port) = url.port().or_else(|| family.default_port()) {
            properties.insert("portNumber".to_string(), port.to_string());
        }
        let database = url.path().trim_start_matches('/');
        if !database.is_empty() {
            properties.insert("databaseName".to_string(), database.to_string());
        }

        let username = params
            .username
            .clone()
            .or_else(|| Some(url.username().to_string()).filter(|u| !u.is_empty()));
        let password = params
            .password
            .clone()
            .or_else(|| url.password().map(String::from));

        Ok(Self {
            dialect,
            xa_driver: xa_driver.into(),
            url: params.masked_url(),
            username,
            password,
            properties,
        })
    }

    /// Add a driver property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl std::fmt::Debug for XaDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XaDataSource")
            .field("dialect", &self.dialect)
            .field("xa_driver", &self.xa_driver)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("has_password", &self.password.is_some())
            .field("properties", &self.properties)
            .finish()
    }
}
