//! Core data model for joining heterogeneous call logs with database state.
//!
//! This crate provides the pure, in-memory building blocks of the logweave
//! pipeline:
//!
//! - [`Value`] — a recursive JSON-compatible datum
//! - [`Schema`] — a structural type descriptor, induced from value samples
//!   by [`SchemaInducer`]
//! - [`Table`] / [`Column`] / [`ExpandedColumn`] — the columnar table model
//! - [`Expander`] — recursive flattening of nested columns via a closed set
//!   of [`ExpandOp`] operators
//! - [`Relation`] — foreign-key and nearest-temporal relationship metadata
//!
//! Everything here is synchronous and allocation-only: ingestion, joining,
//! and back-projection live in `logweave-join`.

pub mod catalog;
pub mod error;
pub mod expand;
pub mod relation;
pub mod schema;
pub mod table;
pub mod value;

pub use catalog::SchemaCatalog;
pub use error::{CoreError, CoreResult};
pub use expand::{derive_column, ExpandOp, Expander, ExpanderConfig};
pub use relation::{Relation, RelationKind};
pub use schema::{FieldSchema, LenRange, Schema, SchemaInducer, SchemaKind};
pub use table::{
    merge_log_and_db, Column, Dump, ExpandedColumn, JoinNote, Table, DB_NAMESPACE, LOG_NAMESPACE,
};
pub use value::Value;
