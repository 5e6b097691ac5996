//! Rule configuration models.
//!
//! Rules are opaque to the bootstrap beyond the schemas they reference.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A logical table and the data nodes it maps onto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRule {
    pub logic_table: String,
    /// Data node references, e.g. `ds_0.orders_0`.
    #[serde(default)]
    pub actual_data_nodes: Vec<String>,
}

/// Rule set for one schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaRules {
    #[serde(default)]
    pub tables: Vec<TableRule>,
    #[serde(default)]
    pub default_data_source: Option<String>,
}

impl SchemaRules {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.default_data_source.is_none()
    }
}

/// Rule configuration for all schemas, in configured order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleConfiguration {
    schemas: IndexMap<String, SchemaRules>,
}

impl RuleConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the rules of a schema.
    pub fn with_schema(mut self, schema: impl Into<String>, rules: SchemaRules) -> Self {
        self.schemas.insert(schema.into(), rules);
        self
    }

    pub fn insert(&mut self, schema: impl Into<String>, rules: SchemaRules) {
        self.schemas.insert(schema.into(), rules);
    }

    /// Schemas referenced by the rules, in configured order.
    pub fn schema_names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn get(&self, schema: &str) -> Option<&SchemaRules> {
        self.schemas.get(schema)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
