//! The two join flavors: foreign-key and nearest-temporal.
//!
//! Both append the target table's expanded columns to the left table under
//! an alias prefix and record a provenance note, so the back-projector can
//! later file the copied columns under the right nested group.

use logweave_core::{Dump, ExpandedColumn, JoinNote, Relation, RelationKind, Table, Value};
use rustc_hash::FxHashMap;

use crate::binlog::{AsOf, TableBinlog};
use crate::config::JoinConfig;
use crate::error::{JoinError, JoinResult};

/// Expanded column carrying each record's parsed event time.
pub const TIME_COLUMN: &str = "log_data.time_parsed";
/// Expanded column carrying each record's request headers.
pub const HEADERS_COLUMN: &str = "log_data.headers";

/// Copies every expanded column of `right` under `prefix`, resolving each
/// left row through `rows`; unmatched rows become null and, when any
/// exist, widen the copied schemas to nullable.
fn copy_right_columns(
    right: &Table,
    prefix: &str,
    rows: &[Option<usize>],
    has_null: bool,
) -> Vec<ExpandedColumn> {
    right
        .expanded
        .iter()
        .map(|column| {
            let mut schema = column.schema.clone();
            if has_null {
                schema = schema.or_nullable(true);
            }
            ExpandedColumn {
                name: format!("{prefix}{}", column.name),
                source_column: column.source_column.clone(),
                ops: column.ops.clone(),
                schema,
                values: rows
                    .iter()
                    .map(|idx| idx.map_or(Value::Null, |i| column.values[i].clone()))
                    .collect(),
            }
        })
        .collect()
}

/// Rewrites the copied columns to the historical row state in effect at
/// each left row's event time.
fn rehydrate(
    left: &Table,
    prefix: &str,
    binlog: &TableBinlog,
    columns: &mut [ExpandedColumn],
    config: &JoinConfig,
) -> JoinResult<()> {
    let position = |name: &str| -> JoinResult<usize> {
        let target = format!("{prefix}{name}");
        columns
            .iter()
            .position(|c| c.name == target)
            .ok_or_else(|| {
                logweave_core::CoreError::ExpandedColumnNotFound {
                    table: left.name.clone(),
                    column: target,
                }
                .into()
            })
    };
    let primary_idx = binlog
        .columns
        .primary_keys
        .iter()
        .map(|name| position(name))
        .collect::<JoinResult<Vec<_>>>()?;
    let all_idx = binlog
        .columns
        .all_columns
        .iter()
        .map(|name| position(name))
        .collect::<JoinResult<Vec<_>>>()?;

    let time_values = &left.expanded_column(TIME_COLUMN)?.values;
    let mut nulled = false;

    for row in 0..left.row_count() {
        let Some(timestamp) = time_values[row].as_f64() else {
            continue;
        };
        let key: Vec<Value> = primary_idx
            .iter()
            .map(|&i| columns[i].values[row].clone())
            .collect();
        let Some(timeline) = binlog.timelines.get(&key) else {
            continue;
        };

        match timeline.as_of(timestamp, config.multi_change)? {
            // Past the last change the snapshot itself is the best state.
            AsOf::NoRecord => {}
            AsOf::Absent => {
                nulled = true;
                for &i in &all_idx {
                    columns[i].values[row] = Value::Null;
                }
            }
            AsOf::Row(state) => {
                for (&i, value) in all_idx.iter().zip(state) {
                    columns[i].values[row] = value.clone();
                }
            }
        }
    }

    if nulled {
        for &i in &all_idx {
            columns[i].schema = columns[i].schema.or_nullable(true);
        }
    }
    Ok(())
}

/// Joins `left` to the relation's target table by foreign-key equality.
///
/// The target column must be primitive and duplicate-free over its
/// non-null values. Every expanded column of the target is copied onto
/// `left` under `prefix`; with a binlog present, the copied values are
/// rehydrated to the state at each row's event time.
///
/// # Errors
///
/// Fails when the relation kind is wrong, the target is non-primitive or
/// non-unique, a referenced table or column is missing, or a copied
/// column name collides.
pub fn join_foreign_key(
    left: &mut Table,
    dump: &Dump,
    relation: &Relation,
    prefix: &str,
    binlog: Option<&TableBinlog>,
    config: &JoinConfig,
) -> JoinResult<()> {
    if relation.kind != RelationKind::ForeignKey {
        return Err(JoinError::UnsupportedRelation);
    }

    let right = dump.table(&relation.right_table)?;
    let right_column = right.expanded_column(&relation.right_column)?;
    if !right_column.schema.is_primitive() {
        return Err(JoinError::NotPrimitiveTarget {
            table: right.name.clone(),
            column: right_column.name.clone(),
        });
    }

    let mut index: FxHashMap<&Value, usize> = FxHashMap::default();
    for (i, value) in right_column.values.iter().enumerate() {
        if value.is_null() {
            continue;
        }
        if index.insert(value, i).is_some() {
            return Err(JoinError::NonUniqueTarget {
                table: right.name.clone(),
                column: right_column.name.clone(),
            });
        }
    }

    let left_column = left.expanded_column(&relation.left_column)?;
    let mut rows = Vec::with_capacity(left_column.values.len());
    let mut has_null = false;
    for value in &left_column.values {
        let idx = if value.is_null() {
            None
        } else {
            index.get(value).copied()
        };
        if idx.is_none() {
            has_null = true;
        }
        rows.push(idx);
    }

    let mut new_columns = copy_right_columns(right, prefix, &rows, has_null);
    if let Some(binlog) = binlog {
        rehydrate(left, prefix, binlog, &mut new_columns, config)?;
    }

    for column in new_columns {
        left.add_expanded(column)?;
    }
    left.provenance.push(JoinNote {
        relation: relation.clone(),
        prefix: prefix.to_owned(),
    });
    Ok(())
}

fn auth_header(headers: &Value) -> Option<&Value> {
    headers
        .as_object()?
        .iter()
        .find_map(|(k, v)| k.eq_ignore_ascii_case("authorization").then_some(v))
}

/// Joins `left` to the relation's target by nearest time at or before each
/// left row, filtered to rows sharing the left row's `authorization`
/// header within the configured session window.
///
/// Both tables must be ascending on [`TIME_COLUMN`]. Only the backward
/// direction exists; forward relations are rejected.
///
/// # Errors
///
/// Fails when the relation kind is wrong, the target table is missing, or
/// either side lacks the time or headers column.
pub fn join_nearest_before(
    left: &mut Table,
    dump: &Dump,
    relation: &Relation,
    prefix: &str,
    config: &JoinConfig,
) -> JoinResult<()> {
    if relation.kind != RelationKind::NearestBefore {
        return Err(JoinError::UnsupportedRelation);
    }

    let right = dump.table(&relation.right_table)?;

    let (rows, has_null) = {
        let left_times = &left.expanded_column(TIME_COLUMN)?.values;
        let left_headers = &left.expanded_column(HEADERS_COLUMN)?.values;
        let right_times = &right.expanded_column(TIME_COLUMN)?.values;
        let right_headers = &right.expanded_column(HEADERS_COLUMN)?.values;

        let mut rows = Vec::with_capacity(left_times.len());
        let mut has_null = false;
        let mut right_idx = 0usize;

        for (left_time, left_header) in left_times.iter().zip(left_headers) {
            let Some(left_time) = left_time.as_f64() else {
                has_null = true;
                rows.push(None);
                continue;
            };
            let left_auth = auth_header(left_header);

            while right_idx < right_times.len() {
                let right_time = right_times[right_idx]
                    .as_f64()
                    .unwrap_or(f64::NEG_INFINITY);
                if right_time > left_time {
                    break;
                }
                right_idx += 1;
            }

            let mut taken = None;
            for candidate in
                (right_idx.saturating_sub(config.session_scan_limit)..right_idx).rev()
            {
                let right_time = right_times[candidate]
                    .as_f64()
                    .unwrap_or(f64::NEG_INFINITY);
                if left_time - right_time > config.session_window_secs {
                    break;
                }
                if auth_header(&right_headers[candidate]) == left_auth {
                    taken = Some(candidate);
                    break;
                }
            }

            if taken.is_none() {
                has_null = true;
            }
            rows.push(taken);
        }
        (rows, has_null)
    };

    for column in copy_right_columns(right, prefix, &rows, has_null) {
        left.add_expanded(column)?;
    }
    left.provenance.push(JoinNote {
        relation: relation.clone(),
        prefix: prefix.to_owned(),
    });
    Ok(())
}
