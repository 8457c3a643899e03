//! Database-snapshot ingestion: materialized row maps into columnar tables.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use logweave_core::{Column, Dump, SchemaCatalog, SchemaInducer, Table, Value};

use crate::error::JoinResult;

/// One materialized snapshot: tables in dump order, each a list of rows
/// keyed by column name.
pub type Snapshot = Vec<(String, Vec<BTreeMap<String, Value>>)>;

fn column_values(rows: &[BTreeMap<String, Value>], column: &str) -> Vec<Value> {
    rows.iter()
        .map(|row| row.get(column).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Builds one columnar table per non-empty snapshot table, inducing each
/// column's schema, plus the matching catalog.
///
/// Column order is the sorted union of row keys; rows missing a column
/// contribute nulls.
///
/// # Errors
///
/// Fails when schema induction fails for a column.
pub fn snapshot_to_dump(
    snapshot: &Snapshot,
    inducer: &SchemaInducer,
) -> JoinResult<(Dump, SchemaCatalog)> {
    let mut dump = Dump::default();
    let mut catalog = SchemaCatalog::new();

    for (table_name, rows) in snapshot {
        if rows.is_empty() {
            continue;
        }
        let names: BTreeSet<&str> = rows.iter().flat_map(|r| r.keys().map(String::as_str)).collect();
        if names.is_empty() {
            continue;
        }

        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let values = column_values(rows, name);
            let schema = inducer.induce(&values)?;
            catalog.insert(table_name, name, schema.clone());
            columns.push(Column {
                name: name.to_owned(),
                schema,
                values,
            });
        }
        dump.tables.push(Table::new(table_name.clone(), columns)?);
    }

    Ok((dump, catalog))
}

/// Re-materializes snapshot tables under a previously induced catalog.
///
/// Catalog columns missing from every row are filled with nulls with a
/// warning; row columns absent from the catalog are dropped with a
/// warning.
///
/// # Errors
///
/// Fails when the column set of a catalog table is empty in a way that
/// produces an invalid table.
pub fn snapshot_with_catalog(snapshot: &Snapshot, catalog: &SchemaCatalog) -> JoinResult<Dump> {
    let mut dump = Dump::default();

    for (table_name, column_schemas) in &catalog.tables {
        if column_schemas.is_empty() {
            continue;
        }
        let rows = snapshot
            .iter()
            .find(|(name, _)| name == table_name)
            .map_or(&[] as &[BTreeMap<String, Value>], |(_, rows)| rows.as_slice());
        if rows.is_empty() {
            warn!(table = %table_name, "snapshot table missing or empty");
        }

        for key in rows
            .iter()
            .flat_map(|r| r.keys())
            .collect::<BTreeSet<_>>()
        {
            if !column_schemas.contains_key(key) {
                warn!(table = %table_name, column = %key, "snapshot column not in catalog");
            }
        }

        let mut columns = Vec::with_capacity(column_schemas.len());
        for (name, schema) in column_schemas {
            if !rows.is_empty() && !rows.iter().any(|r| r.contains_key(name)) {
                warn!(table = %table_name, column = %name, "catalog column missing from snapshot");
            }
            columns.push(Column {
                name: name.clone(),
                schema: schema.clone(),
                values: column_values(rows, name),
            });
        }
        dump.tables.push(Table::new(table_name.clone(), columns)?);
    }

    Ok(dump)
}
