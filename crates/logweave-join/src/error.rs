//! Error types for binlog reconstruction, joining, and back-projection.

use logweave_core::CoreError;
use thiserror::Error;

/// Errors raised by the join crate.
///
/// Callers distinguish fatal from recoverable by position: [`join_all`]
/// catches per-relation failures, logs them, and moves on, while errors
/// escaping the pipeline itself are fatal.
///
/// [`join_all`]: crate::join_all
#[derive(Debug, Error)]
pub enum JoinError {
    /// Table-model or schema violation from the core crate.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Join target column holds duplicate non-null values.
    #[error("non-unique join target {table}.{column}")]
    NonUniqueTarget {
        /// Target table.
        table: String,
        /// Target column.
        column: String,
    },

    /// Join target column is not scalar-typed.
    #[error("join target {table}.{column} is not primitive")]
    NotPrimitiveTarget {
        /// Target table.
        table: String,
        /// Target column.
        column: String,
    },

    /// The relation kind is not one this engine executes.
    #[error("unsupported relation kind")]
    UnsupportedRelation,

    /// A change log row touched a column the directory does not list.
    #[error("unknown column {column} in change log for table {table}")]
    UnknownBinlogColumn {
        /// Table name.
        table: String,
        /// Offending column.
        column: String,
    },

    /// A change log event referenced a table missing from the directory.
    #[error("table {0} not found in the column directory")]
    UnknownBinlogTable(String),

    /// A change log row carried the wrong number of columns.
    #[error("column count mismatch in table {table}: expected {expected}, got {got}")]
    ColumnCountMismatch {
        /// Table name.
        table: String,
        /// Directory column count.
        expected: usize,
        /// Row column count.
        got: usize,
    },

    /// An update event rewrote a primary key.
    #[error("primary key {column} changed in table {table}")]
    PrimaryKeyChanged {
        /// Table name.
        table: String,
        /// Key column.
        column: String,
    },

    /// An update event's old and new rows named different columns.
    #[error("old/new column sets differ in table {table}")]
    KeySetMismatch {
        /// Table name.
        table: String,
    },

    /// A change log event lacked the row payload its kind requires.
    #[error("malformed change log row in table {table}")]
    MalformedRow {
        /// Table name.
        table: String,
    },

    /// Events for one row arrived with decreasing timestamps.
    #[error("timestamp regression in table {table} at {timestamp}")]
    OutOfOrder {
        /// Table name.
        table: String,
        /// Offending timestamp.
        timestamp: i64,
    },

    /// An event's old row did not match the previous event's new row.
    #[error("change discontinuity in table {table} at {timestamp}")]
    Discontinuity {
        /// Table name.
        table: String,
        /// Offending timestamp.
        timestamp: i64,
    },

    /// A timeline was asked for state but holds no changes.
    #[error("timeline holds no changes")]
    EmptyTimeline,

    /// Multiple changes landed inside one as-of bracket under the fail
    /// policy.
    #[error("multiple changes bracket timestamp {0}")]
    SimultaneousChanges(f64),

    /// A timestamp string did not match the expected layout.
    #[error("unparseable timestamp: {0}")]
    TimeParse(#[from] chrono::ParseError),

    /// Back-projection met the same column twice for one group.
    #[error("duplicate back-projected column {0}")]
    DuplicateBackColumn(String),

    /// Back-projection met the same joined-log group twice.
    #[error("duplicate back-projected group {0}")]
    DuplicateBackGroup(String),

    /// A zero-op column matched no join prefix and is not a known root.
    #[error("unclassifiable column {0} during back-projection")]
    UnknownBackColumn(String),

    /// A join note referenced a table outside both namespaces.
    #[error("unknown namespace on joined table {0}")]
    UnknownBackTable(String),

    /// The table has no root `log_data` column to project onto.
    #[error("log_data column not found")]
    MissingLogData,

    /// A record root (or an injected group field) is not an object.
    #[error("record field {0} is not an object")]
    NotAnObject(&'static str),
}

/// Convenience alias for join-crate results.
pub type JoinResult<T> = Result<T, JoinError>;
