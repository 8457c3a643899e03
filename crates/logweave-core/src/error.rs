//! Core error types.
//!
//! Provides [`CoreError`] for the value/schema/table/expansion layers, plus
//! a convenience [`CoreResult`] alias. Every variant here is a *fatal*
//! structural violation in the sense of the pipeline's error tiers: callers
//! that can degrade gracefully (the join pipeline) catch these at the unit
//! boundary and log instead of aborting.

use thiserror::Error;

/// Result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors from the value, schema, table, and expansion layers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Schema induction was handed an empty sample set.
    #[error("cannot induce a schema from an empty sample")]
    EmptySample,

    /// A table was constructed with no columns.
    #[error("table '{0}' has no columns")]
    EmptyTable(String),

    /// Two columns in one table share a name.
    #[error("duplicate column '{column}' in table '{table}'")]
    DuplicateColumn {
        /// Table being built or extended.
        table: String,
        /// The colliding column name.
        column: String,
    },

    /// A column's row count disagrees with the table's.
    #[error("column '{column}' in table '{table}' has {got} rows, expected {expected}")]
    ColumnLength {
        /// Table being built or extended.
        table: String,
        /// The offending column.
        column: String,
        /// Row count of the table.
        expected: usize,
        /// Row count of the column.
        got: usize,
    },

    /// A raw column lookup failed.
    #[error("column '{column}' not found in table '{table}'")]
    ColumnNotFound {
        /// Table searched.
        table: String,
        /// Missing column name.
        column: String,
    },

    /// An expanded column lookup failed.
    #[error("expanded column '{column}' not found in table '{table}'")]
    ExpandedColumnNotFound {
        /// Table searched.
        table: String,
        /// Missing column name.
        column: String,
    },

    /// A table lookup in a dump failed.
    #[error("table '{0}' not found in dump")]
    TableNotFound(String),

    /// An object schema has no field with the requested name.
    #[error("field '{0}' not found in object schema")]
    FieldNotFound(String),

    /// An expansion operator was applied to a value of the wrong kind.
    #[error("expansion expected a {expected} value, got {got}")]
    ValueKind {
        /// Kind the operator requires.
        expected: &'static str,
        /// Kind actually seen.
        got: &'static str,
    },

    /// An expansion operator was applied to a schema of the wrong shape.
    #[error("expansion expected a {expected} schema, got {got}")]
    SchemaShape {
        /// Shape the operator requires.
        expected: &'static str,
        /// Shape actually seen.
        got: &'static str,
    },
}
