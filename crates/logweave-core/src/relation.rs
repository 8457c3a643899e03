//! Relationship metadata driving the join engine.

use serde::{Deserialize, Serialize};

/// How two tables relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    /// Equality against a (quasi-)unique target column.
    ForeignKey,
    /// Nearest time-ordered event at or before the source event, with a
    /// session-affinity filter. The only temporal variant the pipeline
    /// constructs.
    NearestBefore,
    /// Symmetric forward variant; modeled for completeness but never
    /// constructed by the pipeline, and rejected by the join engine.
    NearestAfter,
}

/// A declared or inferred relationship between two table columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Join flavor.
    pub kind: RelationKind,
    /// Namespaced source table name (e.g. `log::orders.create`).
    pub left_table: String,
    /// Source column; empty for temporal joins, which key on time instead.
    pub left_column: String,
    /// Namespaced target table name (e.g. `db::orders`).
    pub right_table: String,
    /// Target column; empty for temporal joins.
    pub right_column: String,
    /// Name the back-projector files the joined group under (the target's
    /// un-namespaced name, possibly `#n`-suffixed to stay unique).
    pub back_name: String,
}
