//! Recursive column flattening.
//!
//! Provides:
//! - [`ExpandOp`] — the closed set of expansion operators, each pairing a
//!   value-transform with a schema-transform on the same enum variant
//! - [`Expander`] — recursive table expansion plus the uniform-array
//!   compression post-pass
//! - [`derive_column`] — one operator application to one expanded column

mod expander;
mod op;

pub use expander::{Expander, ExpanderConfig};
pub use op::ExpandOp;

use crate::error::CoreResult;
use crate::table::ExpandedColumn;

/// Applies one operator to a column, producing the derived column with its
/// path-encoding name, extended operator chain, transformed schema, and
/// transformed values.
pub fn derive_column(parent: &ExpandedColumn, op: &ExpandOp) -> CoreResult<ExpandedColumn> {
    let schema = op.derive_schema(&parent.schema)?;
    let values = parent
        .values
        .iter()
        .map(|v| op.apply_nullable(v))
        .collect::<CoreResult<Vec<_>>>()?;

    let mut ops = parent.ops.clone();
    ops.push(op.clone());

    Ok(ExpandedColumn {
        name: format!("{}{}", parent.name, op.suffix()),
        source_column: parent.source_column.clone(),
        ops,
        schema,
        values,
    })
}
