//! Dialect adapters.
//!
//! A [`DialectAdapter`] bundles the backend-specific strategies the proxy needs
//! for one SQL dialect:
//! - URL recognition (does this node URL belong to the dialect?)
//! - Trunk-type mapping (which database family is the dialect compatible with?)
//! - Fetch-size policy (how to stream large result sets per driver)
//! - XA data source construction (how the transaction coordinator reaches a node)
//!
//! Each capability is a plain closure, so adding a dialect means registering a
//! new adapter value with the [`AdapterRegistry`], not defining a new type.

pub mod builtin;
pub mod fetch_size;
pub mod registry;
pub mod trunk;
pub mod xa;

pub use fetch_size::{FetchSizeRule, JDBC_DRIVER, SQLX_DRIVER};
pub use registry::AdapterRegistry;
pub use trunk::{ResolvedDialect, resolve_trunk_type};
pub use xa::XaDataSource;

use crate::error::{ProxyError, ProxyResult};
use crate::models::{ConnectionParameters, DatabaseType};
use std::sync::Arc;

/// Recognizes node URLs belonging to a dialect.
pub type UrlRecognizer = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Picks a fetch-size rule for a driver tag.
pub type FetchSizePolicy = Arc<dyn Fn(&str) -> FetchSizeRule + Send + Sync>;

/// Builds the XA data source definition for a node.
pub type XaDataSourceBuilder =
    Arc<dyn Fn(&ConnectionParameters) -> ProxyResult<XaDataSource> + Send + Sync>;

/// Where a dialect's trunk database type comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrunkMapping {
    /// The dialect is itself a trunk family.
    Native(DatabaseType),
    /// The dialect takes the trunk type of another registered adapter.
    Delegate(String),
}

/// Strategy bundle for one SQL dialect, identified by a unique tag.
#[derive(Clone)]
pub struct DialectAdapter {
    tag: String,
    trunk: TrunkMapping,
    recognizer: UrlRecognizer,
    fetch_size: FetchSizePolicy,
    xa_builder: XaDataSourceBuilder,
}

impl DialectAdapter {
    /// Start building an adapter.
    pub fn builder(tag: impl Into<String>, trunk: TrunkMapping) -> DialectAdapterBuilder {
        DialectAdapterBuilder::new(tag.into(), trunk)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn trunk_mapping(&self) -> &TrunkMapping {
        &self.trunk
    }

    /// Check whether a node URL belongs to this dialect.
    pub fn recognize(&self, url: &str) -> bool {
        (self.recognizer)(url)
    }

    /// Fetch-size rule for statements issued through the given driver.
    pub fn fetch_size(&self, driver: &str) -> FetchSizeRule {
        (self.fetch_size)(driver)
    }

    /// Build the XA data source definition for a node.
    pub fn build_xa_data_source(&self, params: &ConnectionParameters) -> ProxyResult<XaDataSource> {
        (self.xa_builder)(params)
    }
}

impl std::fmt::Debug for DialectAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialectAdapter")
            .field("tag", &self.tag)
            .field("trunk", &self.trunk)
            .finish_non_exhaustive()
    }
}

/// Builder for [`DialectAdapter`].
///
/// Unset capabilities default to: recognize nothing, driver-default fetch
/// size, and no XA support.
pub struct DialectAdapterBuilder {
    tag: String,
    trunk: TrunkMapping,
    recognizer: Option<UrlRecognizer>,
    fetch_size: Option<FetchSizePolicy>,
    xa_builder: Option<XaDataSourceBuilder>,
}

impl DialectAdapterBuilder {
    fn new(tag: String, trunk: TrunkMapping) -> Self {
        Self {
            tag,
            trunk,
            recognizer: None,
            fetch_size: None,
            xa_builder: None,
        }
    }

    /// Recognize URLs with a custom predicate.
    pub fn recognizer(mut self, f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.recognizer = Some(Arc::new(f));
        self
    }

    /// Recognize URLs starting with any of the given prefixes (case-insensitive).
    pub fn url_prefixes(self, prefixes: &[&str]) -> Self {
        let prefixes: Vec<String> = prefixes.iter().map(|p| p.to_ascii_lowercase()).collect();
        self.recognizer(move |url| {
            let lower = url.trim().to_ascii_lowercase();
            prefixes.iter().any(|p| lower.starts_with(p.as_str()))
        })
    }

    pub fn fetch_size(mut self, f: impl Fn(&str) -> FetchSizeRule + Send + Sync + 'static) -> Self {
        self.fetch_size = Some(Arc::new(f));
        self
    }

    pub fn xa_data_source(
        mut self,
        f: impl Fn(&ConnectionParameters) -> ProxyResult<XaDataSource> + Send + Sync + 'static,
    ) -> Self {
        self.xa_builder = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> DialectAdapter {
        let tag = self.tag;
        let xa_builder: XaDataSourceBuilder = match self.xa_builder {
            Some(builder) => builder,
            None => {
                let tag = tag.clone();
                Arc::new(move |_: &ConnectionParameters| {
                    Err(ProxyError::config(format!(
                        "Dialect '{}' does not support XA transactions",
                        tag
                    )))
                })
            }
        };
        let recognizer: UrlRecognizer = match self.recognizer {
            Some(recognizer) => recognizer,
            None => Arc::new(|_: &str| false),
        };
        let fetch_size: FetchSizePolicy = match self.fetch_size {
            Some(policy) => policy,
            None => Arc::new(|_: &str| FetchSizeRule::DriverDefault),
        };

        DialectAdapter {
            tag,
            trunk: self.trunk,
            recognizer,
            fetch_size,
            xa_builder,
        }
    }
}
