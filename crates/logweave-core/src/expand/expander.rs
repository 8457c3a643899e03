//! Recursive table expansion.

use tracing::debug;

use crate::error::CoreResult;
use crate::schema::{Schema, SchemaInducer, SchemaKind};
use crate::table::{ExpandedColumn, Table};
use crate::value::Value;

use super::{derive_column, ExpandOp};

/// Knobs controlling which optional operators the expander plans.
///
/// Defaults keep expansion lean: only the structurally complete operators
/// (field projection, flattening, dict key/value split) run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpanderConfig {
    /// Emit a presence-flag column for every optional object field.
    pub object_expand_exists: bool,
    /// Emit positional element columns for the first `n` array slots.
    pub array_expand_max: usize,
    /// Emit presence-flag columns for optional fields of objects inside
    /// arrays.
    pub array_of_object_expand_exists: bool,
    /// Emit a length column for every array.
    pub array_expand_length: bool,
}

/// Drives expansion to a fixpoint: every raw column is re-inserted with an
/// empty operator chain, then every applicable operator is applied
/// recursively until only inexpandable schemas remain.
#[derive(Debug, Default)]
pub struct Expander {
    config: ExpanderConfig,
    inducer: SchemaInducer,
}

impl Expander {
    /// Builds an expander with the given configuration.
    #[must_use]
    pub fn new(config: ExpanderConfig) -> Self {
        Self {
            config,
            inducer: SchemaInducer::default(),
        }
    }

    /// Expands every raw column of `table` in place, appending the derived
    /// columns, then compresses uniform arrays.
    ///
    /// # Errors
    ///
    /// Fails when a derived column collides with an existing name or an
    /// operator meets a value its schema did not predict; both indicate
    /// corrupt input and are fatal.
    pub fn expand_table(&self, table: &mut Table) -> CoreResult<()> {
        let roots: Vec<(String, Schema, Vec<Value>)> = table
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.schema.clone(), c.values.clone()))
            .collect();

        for (name, schema, values) in roots {
            table.add_expanded(ExpandedColumn {
                name: name.clone(),
                source_column: name.clone(),
                ops: Vec::new(),
                schema,
                values,
            })?;
            self.expand_column(table, &name)?;
        }

        self.compress_uniform_arrays(table)?;
        debug!(
            table = %table.name,
            columns = table.expanded.len(),
            "expanded table"
        );
        Ok(())
    }

    fn expand_column(&self, table: &mut Table, name: &str) -> CoreResult<()> {
        let schema = table.expanded_column(name)?.schema.clone();
        for op in self.planned_ops(&schema) {
            let child = derive_column(table.expanded_column(name)?, &op)?;
            let child_name = child.name.clone();
            table.add_expanded(child)?;
            self.expand_column(table, &child_name)?;
        }
        Ok(())
    }

    /// Operators applicable to a schema, in deterministic order.
    fn planned_ops(&self, schema: &Schema) -> Vec<ExpandOp> {
        let mut ops = Vec::new();
        match &schema.kind {
            SchemaKind::Object { fields } => {
                for field in fields {
                    ops.push(ExpandOp::ObjectExpand(field.name.clone()));
                    if self.config.object_expand_exists && !field.always_exists {
                        ops.push(ExpandOp::ObjectFieldExists(field.name.clone()));
                    }
                }
            }
            SchemaKind::Array { len, element } => {
                if self.config.array_expand_length {
                    ops.push(ExpandOp::ArrayLen);
                }
                for idx in 0..self.config.array_expand_max.min(len.max) {
                    ops.push(ExpandOp::ArrayIdx(idx));
                }
                match &element.kind {
                    SchemaKind::Array { .. } => ops.push(ExpandOp::ArrayFlatten),
                    SchemaKind::Object { fields } => {
                        for field in fields {
                            ops.push(ExpandOp::ArrayExpand(field.name.clone()));
                            if self.config.array_of_object_expand_exists && !field.always_exists {
                                ops.push(ExpandOp::ArrayExpandExists(field.name.clone()));
                            }
                        }
                    }
                    SchemaKind::Dict { .. } => {
                        ops.push(ExpandOp::ArrayDictKey);
                        ops.push(ExpandOp::ArrayDictValue);
                    }
                    _ => {}
                }
            }
            SchemaKind::Dict { .. } => {
                ops.push(ExpandOp::DictKey);
                ops.push(ExpandOp::DictValue);
            }
            _ => {}
        }
        ops
    }

    /// Collapses arrays-of-scalars whose every row holds at most one
    /// distinct element (nulls count as a distinct element) into a plain
    /// scalar column named without the `[]` markers.
    ///
    /// The scalar column carries an empty operator chain and points at the
    /// array column it came from, so the back-projection pass can tell it
    /// apart from a raw column and skip it. Columns whose rewritten name is
    /// already taken (dict-derived `#key`/`#value` columns have no `[]` to
    /// strip) are left uncompressed.
    fn compress_uniform_arrays(&self, table: &mut Table) -> CoreResult<()> {
        let mut compressed = Vec::new();

        for column in &table.expanded {
            if !matches!(column.schema.kind, SchemaKind::Array { .. })
                || !column.schema.is_basic()
            {
                continue;
            }

            let mut scalars = Vec::with_capacity(column.values.len());
            let mut uniform = true;
            for value in &column.values {
                let scalar = match value {
                    Value::Null => Value::Null,
                    Value::Array(items) => {
                        let mut distinct: Vec<&Value> = Vec::new();
                        for item in items {
                            if !distinct.contains(&item) {
                                distinct.push(item);
                            }
                        }
                        match distinct.as_slice() {
                            [] => Value::Null,
                            [only] => (*only).clone(),
                            _ => {
                                uniform = false;
                                break;
                            }
                        }
                    }
                    _ => {
                        uniform = false;
                        break;
                    }
                };
                scalars.push(scalar);
            }
            if !uniform || scalars.is_empty() {
                continue;
            }

            let schema = self.inducer.induce(&scalars)?;
            compressed.push(ExpandedColumn {
                name: column.name.replace("[]", ""),
                source_column: column.name.clone(),
                ops: Vec::new(),
                schema,
                values: scalars,
            });
        }

        for column in compressed {
            if table.has_expanded(&column.name) {
                continue;
            }
            debug!(
                table = %table.name,
                column = %column.name,
                from = %column.source_column,
                "compressed uniform array"
            );
            table.add_expanded(column)?;
        }
        Ok(())
    }
}
