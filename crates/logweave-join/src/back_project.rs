//! Back-projection of joined tables into nested records.
//!
//! Inverts the flattening for zero-op columns only: the un-prefixed
//! `log_data` column is each record's root, prefixed columns are filed
//! into `related_db_tables` / `related_event_logs` groups according to the
//! table's join provenance, and compression-derived scalars are dropped
//! (their array originals carry the data).

use std::collections::BTreeMap;

use logweave_core::{ExpandedColumn, Table, Value, DB_NAMESPACE, LOG_NAMESPACE};

use crate::error::{JoinError, JoinResult};

/// Key under which joined database rows are nested in each record.
const DB_GROUP_FIELD: &str = "related_db_tables";
/// Key under which joined event logs are nested in each record.
const LOG_GROUP_FIELD: &str = "related_event_logs";
/// The root column name.
const ROOT_COLUMN: &str = "log_data";

struct Classified<'a> {
    root: &'a ExpandedColumn,
    joined_db: BTreeMap<&'a str, BTreeMap<&'a str, &'a ExpandedColumn>>,
    joined_logs: BTreeMap<&'a str, &'a ExpandedColumn>,
}

fn classify(table: &Table) -> JoinResult<Classified<'_>> {
    let mut root = None;
    let mut joined_db: BTreeMap<&str, BTreeMap<&str, &ExpandedColumn>> = BTreeMap::new();
    let mut joined_logs: BTreeMap<&str, &ExpandedColumn> = BTreeMap::new();

    'columns: for column in &table.expanded {
        if !column.ops.is_empty() {
            continue;
        }

        for note in &table.provenance {
            let Some(rest) = column.name.strip_prefix(note.prefix.as_str()) else {
                continue;
            };
            let back_name = note.relation.back_name.as_str();
            if note.relation.right_table.starts_with(DB_NAMESPACE) {
                let group = joined_db.entry(back_name).or_default();
                if group.insert(rest, column).is_some() {
                    return Err(JoinError::DuplicateBackColumn(rest.to_owned()));
                }
            } else if note.relation.right_table.starts_with(LOG_NAMESPACE) {
                if rest == ROOT_COLUMN {
                    if joined_logs.insert(back_name, column).is_some() {
                        return Err(JoinError::DuplicateBackGroup(back_name.to_owned()));
                    }
                } else if column.source_column == rest {
                    return Err(JoinError::UnknownBackColumn(column.name.clone()));
                }
                // Otherwise a compression-derived scalar copied over by the
                // join; the nested root already holds the data.
            } else {
                return Err(JoinError::UnknownBackTable(
                    note.relation.right_table.clone(),
                ));
            }
            continue 'columns;
        }

        if column.name == ROOT_COLUMN {
            if root.is_some() {
                return Err(JoinError::DuplicateBackColumn(ROOT_COLUMN.to_owned()));
            }
            root = Some(column);
        } else if column.source_column != column.name {
            // Compression-derived scalar; its array original holds the data.
            continue;
        } else {
            return Err(JoinError::UnknownBackColumn(column.name.clone()));
        }
    }

    Ok(Classified {
        root: root.ok_or(JoinError::MissingLogData)?,
        joined_db,
        joined_logs,
    })
}

fn group_object<'a>(
    map: &'a mut BTreeMap<String, Value>,
    field: &'static str,
) -> JoinResult<&'a mut BTreeMap<String, Value>> {
    match map
        .entry(field.to_owned())
        .or_insert_with(|| Value::Object(BTreeMap::new()))
    {
        Value::Object(inner) => Ok(inner),
        _ => Err(JoinError::NotAnObject(field)),
    }
}

/// Projects a joined table back into one nested record per row.
///
/// # Errors
///
/// Fails when a zero-op column cannot be classified, a group or column is
/// produced twice, the root column is missing, or a record root is not an
/// object.
pub fn table_to_records(table: &Table) -> JoinResult<Vec<Value>> {
    let classified = classify(table)?;

    let mut records = Vec::with_capacity(table.row_count());
    for row in 0..table.row_count() {
        let Value::Object(mut record) = classified.root.values[row].clone() else {
            return Err(JoinError::NotAnObject(ROOT_COLUMN));
        };

        if !classified.joined_db.is_empty() {
            let db_groups = group_object(&mut record, DB_GROUP_FIELD)?;
            for (group_name, columns) in &classified.joined_db {
                let has_non_null = columns.values().any(|c| !c.values[row].is_null());
                if has_non_null || db_groups.contains_key(*group_name) {
                    let group = match db_groups
                        .entry((*group_name).to_owned())
                        .or_insert_with(|| Value::Object(BTreeMap::new()))
                    {
                        Value::Object(inner) => inner,
                        _ => return Err(JoinError::NotAnObject(DB_GROUP_FIELD)),
                    };
                    for (column_name, column) in columns {
                        if group
                            .insert((*column_name).to_owned(), column.values[row].clone())
                            .is_some()
                        {
                            return Err(JoinError::DuplicateBackColumn(
                                (*column_name).to_owned(),
                            ));
                        }
                    }
                } else {
                    db_groups.insert((*group_name).to_owned(), Value::Null);
                }
            }
        }

        if !classified.joined_logs.is_empty() {
            let log_groups = group_object(&mut record, LOG_GROUP_FIELD)?;
            for (group_name, column) in &classified.joined_logs {
                if log_groups
                    .insert((*group_name).to_owned(), column.values[row].clone())
                    .is_some()
                {
                    return Err(JoinError::DuplicateBackGroup((*group_name).to_owned()));
                }
            }
        }

        records.push(Value::Object(record));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use logweave_core::{Column, Relation, RelationKind, Schema, SchemaInducer};

    use super::*;

    fn v(json: &str) -> Value {
        Value::from(serde_json::from_str::<serde_json::Value>(json).unwrap())
    }

    fn log_table(rows: Vec<Value>) -> Table {
        let schema = SchemaInducer::default().induce(&rows).unwrap();
        let mut table = Table::new(
            "log::orders.create",
            vec![Column {
                name: ROOT_COLUMN.into(),
                schema: schema.clone(),
                values: rows.clone(),
            }],
        )
        .unwrap();
        table
            .add_expanded(ExpandedColumn {
                name: ROOT_COLUMN.into(),
                source_column: ROOT_COLUMN.into(),
                ops: vec![],
                schema,
                values: rows,
            })
            .unwrap();
        table
    }

    #[test]
    fn test_unjoined_table_round_trips() {
        let rows = vec![v(r#"{"api": "a", "x": 1}"#), v(r#"{"api": "a", "x": 2}"#)];
        let records = table_to_records(&log_table(rows.clone())).unwrap();
        assert_eq!(records, rows);
    }

    #[test]
    fn test_joined_db_columns_nest_under_group() {
        let mut table = log_table(vec![v(r#"{"x": 1}"#), v(r#"{"x": 2}"#)]);
        table
            .add_expanded(ExpandedColumn {
                name: "orders@status".into(),
                source_column: "status".into(),
                ops: vec![],
                schema: Schema::str_(true, None, false),
                values: vec![Value::Str("paid".into()), Value::Null],
            })
            .unwrap();
        table.provenance.push(logweave_core::JoinNote {
            relation: Relation {
                kind: RelationKind::ForeignKey,
                left_table: "log::orders.create".into(),
                left_column: "log_data.x".into(),
                right_table: "db::orders".into(),
                right_column: "id".into(),
                back_name: "orders".into(),
            },
            prefix: "orders@".into(),
        });

        let records = table_to_records(&table).unwrap();
        assert_eq!(
            records[0],
            v(r#"{"x": 1, "related_db_tables": {"orders": {"status": "paid"}}}"#)
        );
        // All-null group collapses to null.
        assert_eq!(
            records[1],
            v(r#"{"x": 2, "related_db_tables": {"orders": null}}"#)
        );
    }

    #[test]
    fn test_joined_log_root_nests_under_event_logs() {
        let mut table = log_table(vec![v(r#"{"x": 1}"#)]);
        table
            .add_expanded(ExpandedColumn {
                name: "log::orders.pay@log_data".into(),
                source_column: ROOT_COLUMN.into(),
                ops: vec![],
                schema: Schema::unknown(true),
                values: vec![v(r#"{"y": 9}"#)],
            })
            .unwrap();
        table.provenance.push(logweave_core::JoinNote {
            relation: Relation {
                kind: RelationKind::NearestBefore,
                left_table: "log::orders.create".into(),
                left_column: String::new(),
                right_table: "log::orders.pay".into(),
                right_column: String::new(),
                back_name: "orders.pay".into(),
            },
            prefix: "log::orders.pay@".into(),
        });

        let records = table_to_records(&table).unwrap();
        assert_eq!(
            records[0],
            v(r#"{"x": 1, "related_event_logs": {"orders.pay": {"y": 9}}}"#)
        );
    }

    #[test]
    fn test_copied_compressed_scalar_is_skipped() {
        // A nearest-before join copies every zero-op column of the right
        // table, including compression-derived scalars; only the copied
        // root may land in the record.
        let mut table = log_table(vec![v(r#"{"x": 1}"#)]);
        table
            .add_expanded(ExpandedColumn {
                name: "log::orders.pay@log_data".into(),
                source_column: ROOT_COLUMN.into(),
                ops: vec![],
                schema: Schema::unknown(true),
                values: vec![v(r#"{"items": [{"sku": "A"}]}"#)],
            })
            .unwrap();
        table
            .add_expanded(ExpandedColumn {
                name: "log::orders.pay@log_data.items.sku".into(),
                source_column: "log_data.items[].sku".into(),
                ops: vec![],
                schema: Schema::str_(true, None, false),
                values: vec![Value::Str("A".into())],
            })
            .unwrap();
        table.provenance.push(logweave_core::JoinNote {
            relation: Relation {
                kind: RelationKind::NearestBefore,
                left_table: "log::orders.create".into(),
                left_column: String::new(),
                right_table: "log::orders.pay".into(),
                right_column: String::new(),
                back_name: "orders.pay".into(),
            },
            prefix: "log::orders.pay@".into(),
        });

        let records = table_to_records(&table).unwrap();
        assert_eq!(
            records[0],
            v(r#"{"x": 1, "related_event_logs": {"orders.pay": {"items": [{"sku": "A"}]}}}"#)
        );
    }

    #[test]
    fn test_unknown_zero_op_column_is_fatal() {
        let mut table = log_table(vec![v(r#"{"x": 1}"#)]);
        table
            .add_expanded(ExpandedColumn {
                name: "stray".into(),
                source_column: "stray".into(),
                ops: vec![],
                schema: Schema::unknown(true),
                values: vec![Value::Null],
            })
            .unwrap();
        assert!(matches!(
            table_to_records(&table),
            Err(JoinError::UnknownBackColumn(_))
        ));
    }

    #[test]
    fn test_compressed_scalar_is_skipped() {
        let mut table = log_table(vec![v(r#"{"x": 1}"#)]);
        table
            .add_expanded(ExpandedColumn {
                name: "log_data.items.orderId".into(),
                source_column: "log_data.items[].orderId".into(),
                ops: vec![],
                schema: Schema::int(true, 1, 9, false),
                values: vec![Value::Int(5)],
            })
            .unwrap();
        let records = table_to_records(&table).unwrap();
        assert_eq!(records, vec![v(r#"{"x": 1}"#)]);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let mut table = log_table(vec![v(r#"{"x": 1}"#)]);
        table.expanded.clear();
        assert!(matches!(
            table_to_records(&table),
            Err(JoinError::MissingLogData)
        ));
    }
}
