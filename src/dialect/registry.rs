//! Dialect adapter registry.
//!
//! Adapters are kept in registration order. URL resolution is first-match,
//! not best-match: register the most specific dialects first. Two adapters
//! whose recognizers both accept a URL are a configuration hazard; the one
//! registered earlier silently wins.

use super::{DialectAdapter, FetchSizeRule, ResolvedDialect, TrunkMapping, builtin};
use crate::error::{ProxyError, ProxyResult};
use crate::models::{DatabaseType, mask_url};
use indexmap::IndexMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    adapters: IndexMap<String, DialectAdapter>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in dialects, most specific first.
    pub fn with_builtin_dialects() -> Self {
        let mut registry = Self::new();
        for adapter in builtin::all() {
            // Built-in tags are distinct.
            let _ = registry.register(adapter);
        }
        registry
    }

    /// Register an adapter under its tag.
    pub fn register(&mut self, adapter: DialectAdapter) -> ProxyResult<()> {
        if self.adapters.contains_key(adapter.tag()) {
            return Err(ProxyError::duplicate_tag(adapter.tag()));
        }
        debug!(tag = %adapter.tag(), "Registered dialect adapter");
        self.adapters.insert(adapter.tag().to_string(), adapter);
        Ok(())
    }

    /// First adapter, in registration order, that recognizes the URL.
    pub fn resolve_by_url(&self, url: &str) -> ProxyResult<&DialectAdapter> {
        self.adapters
            .values()
            .find(|adapter| adapter.recognize(url))
            .ok_or_else(|| ProxyError::no_matching_adapter(mask_url(url)))
    }

    pub fn resolve_by_tag(&self, tag: &str) -> ProxyResult<&DialectAdapter> {
        self.adapters
            .get(tag)
            .ok_or_else(|| ProxyError::unknown_adapter(tag))
    }

    /// Trunk type of an adapter, following delegation through the registry.
    ///
    /// A dangling delegate or a delegation cycle is reported as an unknown adapter.
    pub fn trunk_type_of(&self, adapter: &DialectAdapter) -> ProxyResult<DatabaseType> {
        let mut visited: Vec<&str> = vec![adapter.tag()];
        let mut current = adapter;
        loop {
            match current.trunk_mapping() {
                TrunkMapping::Native(database_type) => return Ok(*database_type),
                TrunkMapping::Delegate(tag) => {
                    if visited.contains(&tag.as_str()) {
                        return Err(ProxyError::unknown_adapter(format!(
                            "{} (trunk delegation cycle: {} -> {})",
                            tag,
                            visited.join(" -> "),
                            tag
                        )));
                    }
                    current = self.resolve_by_tag(tag)?;
                    visited.push(current.tag());
                }
            }
        }
    }

    /// The adapter that recognizes the URL, with its trunk type.
    pub fn resolve_dialect(&self, url: &str) -> ProxyResult<ResolvedDialect> {
        let adapter = self.resolve_by_url(url)?;
        Ok(ResolvedDialect {
            tag: adapter.tag().to_string(),
            trunk: self.trunk_type_of(adapter)?,
        })
    }

    /// Fetch-size rule of a dialect for the given driver.
    pub fn fetch_size_for(&self, tag: &str, driver: &str) -> ProxyResult<FetchSizeRule> {
        Ok(self.resolve_by_tag(tag)?.fetch_size(driver))
    }

    /// Registered tags, in registration order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
