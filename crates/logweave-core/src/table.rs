//! Columnar table model.
//!
//! A [`Table`] holds its raw [`Column`]s plus the [`ExpandedColumn`]s the
//! expander and join engine append. Construction and every append enforce
//! the fatal invariants: at least one column, identical row counts, unique
//! column names. Stages never mutate existing columns in place — they only
//! append — which keeps each pipeline stage composable.

use crate::error::{CoreError, CoreResult};
use crate::expand::ExpandOp;
use crate::relation::Relation;
use crate::schema::Schema;
use crate::value::Value;

/// Namespace prefix for log-origin tables.
pub const LOG_NAMESPACE: &str = "log::";
/// Namespace prefix for database-origin tables.
pub const DB_NAMESPACE: &str = "db::";

/// A named, typed, ordered sequence of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Induced or declared schema.
    pub schema: Schema,
    /// Row values, one per table row.
    pub values: Vec<Value>,
}

/// A column derived from a raw column by a chain of expansion operators.
///
/// Raw columns are re-inserted with an empty operator list; the operator
/// chain lets the original nesting be reconstructed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedColumn {
    /// Column name, encoding the access path (e.g. `payload.items[].id`).
    pub name: String,
    /// Name of the column this one was derived from.
    pub source_column: String,
    /// Operators applied, outermost first. Empty for raw columns.
    pub ops: Vec<ExpandOp>,
    /// Schema after all operators.
    pub schema: Schema,
    /// Row values after all operators.
    pub values: Vec<Value>,
}

/// One applied join, recorded on the table it extended.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinNote {
    /// The relation that was joined.
    pub relation: Relation,
    /// Alias prefix under which the target's columns were copied.
    pub prefix: String,
}

/// A named table: raw columns, expanded columns, and join provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Table name, namespaced once merged (`log::X` / `db::Y`).
    pub name: String,
    /// Raw columns as ingested.
    pub columns: Vec<Column>,
    /// Columns appended by expansion and joining.
    pub expanded: Vec<ExpandedColumn>,
    /// Joins applied so far, in order.
    pub provenance: Vec<JoinNote>,
}

impl Table {
    /// Builds a table, validating the length and name invariants.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> CoreResult<Self> {
        let name = name.into();
        let Some(first) = columns.first() else {
            return Err(CoreError::EmptyTable(name));
        };

        let rows = first.values.len();
        let mut seen = std::collections::HashSet::new();
        for column in &columns {
            if column.values.len() != rows {
                return Err(CoreError::ColumnLength {
                    table: name.clone(),
                    column: column.name.clone(),
                    expected: rows,
                    got: column.values.len(),
                });
            }
            if !seen.insert(column.name.as_str()) {
                return Err(CoreError::DuplicateColumn {
                    table: name.clone(),
                    column: column.name.clone(),
                });
            }
        }
        drop(seen);

        Ok(Self {
            name,
            columns,
            expanded: Vec::new(),
            provenance: Vec::new(),
        })
    }

    /// Number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.columns[0].values.len()
    }

    /// Looks up a raw column.
    pub fn column(&self, name: &str) -> CoreResult<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| CoreError::ColumnNotFound {
                table: self.name.clone(),
                column: name.to_owned(),
            })
    }

    /// Looks up an expanded column.
    pub fn expanded_column(&self, name: &str) -> CoreResult<&ExpandedColumn> {
        self.expanded
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| CoreError::ExpandedColumnNotFound {
                table: self.name.clone(),
                column: name.to_owned(),
            })
    }

    /// Whether an expanded column with this name exists.
    #[must_use]
    pub fn has_expanded(&self, name: &str) -> bool {
        self.expanded.iter().any(|c| c.name == name)
    }

    /// Appends an expanded column, validating length and name uniqueness.
    pub fn add_expanded(&mut self, column: ExpandedColumn) -> CoreResult<()> {
        if column.values.len() != self.row_count() {
            return Err(CoreError::ColumnLength {
                table: self.name.clone(),
                expected: self.row_count(),
                got: column.values.len(),
                column: column.name,
            });
        }
        if self.has_expanded(&column.name) {
            return Err(CoreError::DuplicateColumn {
                table: self.name.clone(),
                column: column.name,
            });
        }
        self.expanded.push(column);
        Ok(())
    }
}

/// A set of tables produced from one snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dump {
    /// Tables in ingestion order.
    pub tables: Vec<Table>,
}

impl Dump {
    /// Looks up a table by (namespaced) name.
    pub fn table(&self, name: &str) -> CoreResult<&Table> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| CoreError::TableNotFound(name.to_owned()))
    }

    /// Whether a table with this name exists.
    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t.name == name)
    }
}

/// Concatenates a log dump and a DB dump into one namespace-disambiguated
/// dump: log tables gain the `log::` prefix, DB tables `db::`.
#[must_use]
pub fn merge_log_and_db(logs: Dump, db: Dump) -> Dump {
    let mut tables = Vec::with_capacity(logs.tables.len() + db.tables.len());
    for mut table in logs.tables {
        table.name = format!("{LOG_NAMESPACE}{}", table.name);
        tables.push(table);
    }
    for mut table in db.tables {
        table.name = format!("{DB_NAMESPACE}{}", table.name);
        tables.push(table);
    }
    Dump { tables }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_column(name: &str, values: Vec<i64>) -> Column {
        let values: Vec<Value> = values.into_iter().map(Value::Int).collect();
        Column {
            name: name.into(),
            schema: Schema::int(false, 0, 100, true),
            values,
        }
    }

    #[test]
    fn test_empty_table_rejected() {
        assert!(matches!(
            Table::new("t", vec![]),
            Err(CoreError::EmptyTable(_))
        ));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let result = Table::new(
            "t",
            vec![int_column("a", vec![1, 2]), int_column("b", vec![1])],
        );
        assert!(matches!(result, Err(CoreError::ColumnLength { .. })));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let result = Table::new(
            "t",
            vec![int_column("a", vec![1]), int_column("a", vec![2])],
        );
        assert!(matches!(result, Err(CoreError::DuplicateColumn { .. })));
    }

    #[test]
    fn test_add_expanded_checks_invariants() {
        let mut table = Table::new("t", vec![int_column("a", vec![1, 2])]).unwrap();
        let col = ExpandedColumn {
            name: "a".into(),
            source_column: "a".into(),
            ops: vec![],
            schema: Schema::int(false, 0, 100, true),
            values: vec![Value::Int(1), Value::Int(2)],
        };
        table.add_expanded(col.clone()).unwrap();

        // Same name again is fatal.
        assert!(matches!(
            table.add_expanded(col.clone()),
            Err(CoreError::DuplicateColumn { .. })
        ));

        // Wrong length is fatal.
        let mut short = col;
        short.name = "b".into();
        short.values.pop();
        assert!(matches!(
            table.add_expanded(short),
            Err(CoreError::ColumnLength { .. })
        ));
    }

    #[test]
    fn test_merge_namespaces() {
        let logs = Dump {
            tables: vec![Table::new("api.create", vec![int_column("a", vec![1])]).unwrap()],
        };
        let db = Dump {
            tables: vec![Table::new("orders", vec![int_column("id", vec![1])]).unwrap()],
        };
        let merged = merge_log_and_db(logs, db);
        assert!(merged.has_table("log::api.create"));
        assert!(merged.has_table("db::orders"));
        assert!(merged.table("db::missing").is_err());
    }
}
