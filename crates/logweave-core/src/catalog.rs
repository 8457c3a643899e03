//! Table/column schema catalog for downstream introspection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::Schema;

/// Induced schemas keyed by table then column.
///
/// Built alongside ingestion and handed to downstream consumers (invariant
/// generation inspects it; re-materialization replays dumps under it).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    /// table name → column name → schema.
    pub tables: BTreeMap<String, BTreeMap<String, Schema>>,
}

impl SchemaCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a column schema.
    pub fn insert(&mut self, table: &str, column: &str, schema: Schema) {
        self.tables
            .entry(table.to_owned())
            .or_default()
            .insert(column.to_owned(), schema);
    }

    /// Looks up a column schema.
    #[must_use]
    pub fn get(&self, table: &str, column: &str) -> Option<&Schema> {
        self.tables.get(table)?.get(column)
    }
}
