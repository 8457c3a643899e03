//! Joining call-log records with database state.
//!
//! Builds on `logweave-core`'s table model to run the full batch pipeline:
//!
//! - [`log_source`] / [`db_source`] — materialized-input adapters turning
//!   raw log records and snapshot rows into columnar dumps
//! - [`binlog`] — per-row timelines reconstructed from a database change
//!   log, answering as-of queries
//! - [`join`] — the foreign-key and nearest-temporal join flavors
//! - [`pipeline`] — [`join_all`], orchestrating every join over every log
//!   table of a dump
//! - [`back_project`] — inversion of the flattening back into nested
//!   records
//!
//! Everything is synchronous and fully materialized; errors recoverable at
//! the batch level are logged via `tracing` and skipped.

pub mod back_project;
pub mod binlog;
pub mod config;
pub mod db_source;
pub mod error;
pub mod join;
pub mod log_source;
pub mod pipeline;

pub use back_project::table_to_records;
pub use binlog::{
    build_binlogs, AsOf, BinlogEvent, BinlogRow, ChangeKind, MultiChangePolicy, TableBinlog,
    TableColumns, Timeline, TIMESTAMP_EARLIEST,
};
pub use config::JoinConfig;
pub use db_source::{snapshot_to_dump, snapshot_with_catalog, Snapshot};
pub use error::{JoinError, JoinResult};
pub use join::{join_foreign_key, join_nearest_before, HEADERS_COLUMN, TIME_COLUMN};
pub use log_source::{log_dump, log_dump_with_catalog, logs_by_api, parse_log_time};
pub use pipeline::{join_all, ForeignKeySpec, JoinAllOutput};
