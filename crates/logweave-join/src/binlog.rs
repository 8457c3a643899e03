//! Historical row reconstruction from a database change log.
//!
//! Row-level change events are grouped per (table, primary-key) into
//! [`Timeline`]s of `(timestamp, state)` pairs, where a state is the full
//! row tuple or absence (before insertion / after deletion). A sentinel at
//! timestamp 0 carries the earliest observed pre-image so queries before
//! the first change still resolve. [`Timeline::as_of`] answers
//! "what did this row look like at time *t*" for the join engine.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use logweave_core::Value;

use crate::error::{JoinError, JoinResult};

/// Sentinel timestamp carrying the pre-image of the first observed change.
pub const TIMESTAMP_EARLIEST: i64 = 0;

/// What a change log event did to its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Row created; only an after-image is present.
    Insert,
    /// Row mutated; before- and after-images are present.
    Update,
    /// Row removed; only a before-image is present.
    Delete,
}

/// One row touched by a change log event.
///
/// Decoders mapping a wire format that carries a single `values` map on
/// inserts and deletes place it on `after` respectively `before`, so a
/// row always names which side of the change each image sits on.
#[derive(Debug, Clone, Default)]
pub struct BinlogRow {
    /// Full row image before the change, keyed by column name.
    pub before: Option<BTreeMap<String, Value>>,
    /// Full row image after the change.
    pub after: Option<BTreeMap<String, Value>>,
}

/// One row-level change log event.
#[derive(Debug, Clone)]
pub struct BinlogEvent {
    /// What happened to the rows.
    pub kind: ChangeKind,
    /// Database (schema) the event belongs to.
    pub database: String,
    /// Table the event touched.
    pub table: String,
    /// Event time as epoch seconds.
    pub timestamp: i64,
    /// Rows touched, each with the images the kind requires.
    pub rows: Vec<BinlogRow>,
}

/// Column directory entry for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumns {
    /// Primary key columns, in key order.
    pub primary_keys: Vec<String>,
    /// All columns, in tuple order.
    pub all_columns: Vec<String>,
}

/// How [`Timeline::as_of`] resolves multiple changes inside one bracket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultiChangePolicy {
    /// Warn and use the state before the earliest bracketed change.
    #[default]
    TakeFirst,
    /// Fail the query.
    Fail,
}

/// Row state resolved by an as-of query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AsOf<'a> {
    /// The query time lies past the last recorded change.
    NoRecord,
    /// The row did not exist at the query time.
    Absent,
    /// The row's full tuple at the query time.
    Row(&'a [Value]),
}

/// Time-ordered states of one row: ascending `(timestamp, state)` pairs,
/// `None` meaning the row was absent.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    /// Changes in ascending timestamp order, sentinel first.
    pub changes: Vec<(i64, Option<Vec<Value>>)>,
}

impl Timeline {
    /// Bracket of change indices whose timestamps fall inside
    /// `(⌊t−1⌋, ⌊t+2⌋)`, clamped to the ends; `None` when `t` lies past
    /// the last change.
    #[allow(clippy::cast_possible_truncation)]
    fn find_at(&self, timestamp: f64) -> JoinResult<Option<(usize, usize)>> {
        let Some(last) = self.changes.last() else {
            return Err(JoinError::EmptyTimeline);
        };
        #[allow(clippy::cast_precision_loss)]
        if timestamp > last.0 as f64 {
            return Ok(None);
        }

        let timestamp_min = (timestamp - 1.0).floor() as i64;
        let timestamp_max = (timestamp + 2.0).floor() as i64;

        let (mut left, mut right) = (0, self.changes.len() - 1);
        while left < right {
            let mid = (left + right) / 2;
            if self.changes[mid].0 < timestamp_min {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        let idx_min = left;

        let (mut left, mut right) = (0, self.changes.len() - 1);
        while left < right {
            let mid = (left + right + 1) / 2;
            if self.changes[mid].0 > timestamp_max {
                right = mid - 1;
            } else {
                left = mid;
            }
        }
        let idx_max = right;

        Ok(Some((idx_min, idx_max)))
    }

    /// Resolves the row state in effect just before `timestamp`.
    ///
    /// # Errors
    ///
    /// Fails on an empty timeline, or when multiple changes bracket the
    /// timestamp under [`MultiChangePolicy::Fail`].
    pub fn as_of(&self, timestamp: f64, policy: MultiChangePolicy) -> JoinResult<AsOf<'_>> {
        let Some((idx_min, idx_max)) = self.find_at(timestamp)? else {
            return Ok(AsOf::NoRecord);
        };

        if idx_max > idx_min {
            match policy {
                MultiChangePolicy::TakeFirst => {
                    warn!(timestamp, "multiple changes bracket timestamp");
                }
                MultiChangePolicy::Fail => {
                    return Err(JoinError::SimultaneousChanges(timestamp));
                }
            }
        }

        let state = if idx_min == 0 {
            warn!(timestamp, "no change before timestamp");
            &self.changes[0].1
        } else {
            &self.changes[idx_min - 1].1
        };
        Ok(match state {
            Some(row) => AsOf::Row(row),
            None => AsOf::Absent,
        })
    }
}

/// Reconstructed per-row timelines for one table.
#[derive(Debug, Clone)]
pub struct TableBinlog {
    /// The table's column directory entry.
    pub columns: TableColumns,
    /// Timelines keyed by primary-key tuple.
    pub timelines: FxHashMap<Vec<Value>, Timeline>,
}

struct RawChange {
    timestamp: i64,
    old: Option<Vec<Value>>,
    new: Option<Vec<Value>>,
}

fn tuple_of(
    map: &BTreeMap<String, Value>,
    columns: &TableColumns,
    table: &str,
) -> JoinResult<Vec<Value>> {
    if map.len() != columns.all_columns.len() {
        return Err(JoinError::ColumnCountMismatch {
            table: table.to_owned(),
            expected: columns.all_columns.len(),
            got: map.len(),
        });
    }
    for key in map.keys() {
        if !columns.all_columns.iter().any(|c| c == key) {
            return Err(JoinError::UnknownBinlogColumn {
                table: table.to_owned(),
                column: key.clone(),
            });
        }
    }
    Ok(columns
        .all_columns
        .iter()
        .map(|c| map.get(c).cloned().unwrap_or(Value::Null))
        .collect())
}

/// Reconstructs per-row timelines from a change log.
///
/// Events for databases other than `database` are ignored. Tables whose
/// primary key is missing or composite are skipped with a debug log; all
/// structural violations (unknown columns, count mismatches, key
/// mutation, timestamp regression, discontinuity) are fatal.
///
/// # Errors
///
/// Fails when an event references a table absent from `directory`, or on
/// any of the structural violations above.
pub fn build_binlogs(
    directory: &BTreeMap<String, TableColumns>,
    events: &[BinlogEvent],
    database: &str,
) -> JoinResult<BTreeMap<String, TableBinlog>> {
    let mut by_table: BTreeMap<&str, Vec<&BinlogEvent>> = BTreeMap::new();
    for event in events {
        if event.database != database {
            continue;
        }
        by_table.entry(&event.table).or_default().push(event);
    }

    let mut binlogs = BTreeMap::new();

    for (table, events) in by_table {
        let Some(columns) = directory.get(table) else {
            return Err(JoinError::UnknownBinlogTable(table.to_owned()));
        };
        if columns.primary_keys.len() != 1 {
            debug!(table, keys = columns.primary_keys.len(), "skipping table without single-column primary key");
            continue;
        }

        // Raw changes grouped by primary-key tuple, arrival order kept.
        let mut groups: Vec<(Vec<Value>, Vec<RawChange>)> = Vec::new();
        for event in events {
            for row in &event.rows {
                let (old, new) = match event.kind {
                    ChangeKind::Insert => (None, Some(&row.after)),
                    ChangeKind::Delete => (Some(&row.before), None),
                    ChangeKind::Update => (Some(&row.before), Some(&row.after)),
                };
                let resolve = |image: Option<&Option<BTreeMap<String, Value>>>| match image {
                    None => Ok(None),
                    Some(Some(map)) => tuple_of(map, columns, table).map(Some),
                    Some(None) => Err(JoinError::MalformedRow {
                        table: table.to_owned(),
                    }),
                };
                let old_map = old.and_then(Option::as_ref);
                let new_map = new.and_then(Option::as_ref);

                if event.kind == ChangeKind::Update {
                    let (Some(old_map), Some(new_map)) = (old_map, new_map) else {
                        return Err(JoinError::MalformedRow {
                            table: table.to_owned(),
                        });
                    };
                    if !old_map.keys().eq(new_map.keys()) {
                        return Err(JoinError::KeySetMismatch {
                            table: table.to_owned(),
                        });
                    }
                    for (key, old_value) in old_map {
                        if new_map[key] != *old_value && columns.primary_keys.contains(key) {
                            return Err(JoinError::PrimaryKeyChanged {
                                table: table.to_owned(),
                                column: key.clone(),
                            });
                        }
                    }
                }

                let key_map = old_map.or(new_map).ok_or(JoinError::MalformedRow {
                    table: table.to_owned(),
                })?;
                let key: Vec<Value> = columns
                    .primary_keys
                    .iter()
                    .map(|k| key_map.get(k).cloned().unwrap_or(Value::Null))
                    .collect();

                let change = RawChange {
                    timestamp: event.timestamp,
                    old: resolve(old)?,
                    new: resolve(new)?,
                };
                match groups.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, changes)) => changes.push(change),
                    None => groups.push((key, vec![change])),
                }
            }
        }

        let mut timelines = FxHashMap::default();
        for (key, changes) in groups {
            let mut last: Option<(i64, &Option<Vec<Value>>)> = None;
            for change in &changes {
                if let Some((last_timestamp, last_state)) = last {
                    if change.timestamp < last_timestamp {
                        return Err(JoinError::OutOfOrder {
                            table: table.to_owned(),
                            timestamp: change.timestamp,
                        });
                    }
                    if change.old != *last_state {
                        return Err(JoinError::Discontinuity {
                            table: table.to_owned(),
                            timestamp: change.timestamp,
                        });
                    }
                }
                last = Some((change.timestamp, &change.new));
            }

            let mut timeline = Vec::with_capacity(changes.len() + 1);
            timeline.push((TIMESTAMP_EARLIEST, changes[0].old.clone()));
            for change in changes {
                timeline.push((change.timestamp, change.new));
            }
            timelines.insert(key, Timeline { changes: timeline });
        }

        binlogs.insert(
            table.to_owned(),
            TableBinlog {
                columns: columns.clone(),
                timelines,
            },
        );
    }

    Ok(binlogs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_state(values: &[i64]) -> Option<Vec<Value>> {
        Some(values.iter().copied().map(Value::Int).collect())
    }

    fn timeline() -> Timeline {
        Timeline {
            changes: vec![
                (0, row_state(&[1, 10])),
                (100, row_state(&[1, 20])),
                (200, None),
            ],
        }
    }

    #[test]
    fn test_as_of_between_changes() {
        let t = timeline();
        assert_eq!(
            t.as_of(50.0, MultiChangePolicy::TakeFirst).unwrap(),
            AsOf::Row(&[Value::Int(1), Value::Int(10)])
        );
        assert_eq!(
            t.as_of(150.0, MultiChangePolicy::TakeFirst).unwrap(),
            AsOf::Row(&[Value::Int(1), Value::Int(20)])
        );
    }

    #[test]
    fn test_as_of_past_last_change() {
        let t = timeline();
        assert_eq!(
            t.as_of(250.0, MultiChangePolicy::TakeFirst).unwrap(),
            AsOf::NoRecord
        );
    }

    #[test]
    fn test_as_of_before_sentinel_returns_earliest() {
        let t = timeline();
        assert_eq!(
            t.as_of(-5.0, MultiChangePolicy::TakeFirst).unwrap(),
            AsOf::Row(&[Value::Int(1), Value::Int(10)])
        );
    }

    #[test]
    fn test_as_of_deleted_row_is_absent() {
        let t = Timeline {
            changes: vec![(0, row_state(&[1, 10])), (100, None)],
        };
        assert_eq!(
            t.as_of(150.0, MultiChangePolicy::TakeFirst).unwrap(),
            AsOf::Absent
        );
    }

    #[test]
    fn test_as_of_bracketed_changes_respect_policy() {
        let t = Timeline {
            changes: vec![
                (0, row_state(&[1, 10])),
                (100, row_state(&[1, 20])),
                (101, row_state(&[1, 30])),
            ],
        };
        // Both the 100 and 101 changes fall inside the (99, 102) bracket.
        assert_eq!(
            t.as_of(100.5, MultiChangePolicy::TakeFirst).unwrap(),
            AsOf::Row(&[Value::Int(1), Value::Int(10)])
        );
        assert!(matches!(
            t.as_of(100.5, MultiChangePolicy::Fail),
            Err(JoinError::SimultaneousChanges(_))
        ));
    }

    #[test]
    fn test_empty_timeline_is_an_error() {
        let t = Timeline::default();
        assert!(matches!(
            t.as_of(0.0, MultiChangePolicy::TakeFirst),
            Err(JoinError::EmptyTimeline)
        ));
    }

    // ── build_binlogs ──

    fn orders_directory() -> BTreeMap<String, TableColumns> {
        let mut directory = BTreeMap::new();
        directory.insert(
            "orders".to_owned(),
            TableColumns {
                primary_keys: vec!["id".into()],
                all_columns: vec!["id".into(), "status".into()],
            },
        );
        directory
    }

    fn image(id: i64, status: &str) -> BTreeMap<String, Value> {
        let mut map = BTreeMap::new();
        map.insert("id".to_owned(), Value::Int(id));
        map.insert("status".to_owned(), Value::Str(status.to_owned()));
        map
    }

    fn update(timestamp: i64, before: BTreeMap<String, Value>, after: BTreeMap<String, Value>) -> BinlogEvent {
        BinlogEvent {
            kind: ChangeKind::Update,
            database: "shop".into(),
            table: "orders".into(),
            timestamp,
            rows: vec![BinlogRow {
                before: Some(before),
                after: Some(after),
            }],
        }
    }

    #[test]
    fn test_build_groups_by_primary_key_and_prepends_sentinel() {
        let events = vec![
            update(100, image(1, "new"), image(1, "paid")),
            update(200, image(1, "paid"), image(1, "shipped")),
        ];
        let binlogs = build_binlogs(&orders_directory(), &events, "shop").unwrap();
        let orders = &binlogs["orders"];
        let timeline = &orders.timelines[&vec![Value::Int(1)]];

        assert_eq!(timeline.changes.len(), 3);
        assert_eq!(timeline.changes[0].0, TIMESTAMP_EARLIEST);
        assert_eq!(
            timeline.changes[0].1,
            Some(vec![Value::Int(1), Value::Str("new".into())])
        );
        assert_eq!(
            timeline.as_of(150.0, MultiChangePolicy::TakeFirst).unwrap(),
            AsOf::Row(&[Value::Int(1), Value::Str("paid".into())])
        );
    }

    #[test]
    fn test_build_filters_other_databases() {
        let mut event = update(100, image(1, "new"), image(1, "paid"));
        event.database = "other".into();
        let binlogs = build_binlogs(&orders_directory(), &[event], "shop").unwrap();
        assert!(binlogs.is_empty());
    }

    #[test]
    fn test_build_insert_then_delete() {
        let events = vec![
            BinlogEvent {
                kind: ChangeKind::Insert,
                database: "shop".into(),
                table: "orders".into(),
                timestamp: 100,
                rows: vec![BinlogRow {
                    before: None,
                    after: Some(image(2, "new")),
                }],
            },
            BinlogEvent {
                kind: ChangeKind::Delete,
                database: "shop".into(),
                table: "orders".into(),
                timestamp: 200,
                rows: vec![BinlogRow {
                    before: Some(image(2, "new")),
                    after: None,
                }],
            },
        ];
        let binlogs = build_binlogs(&orders_directory(), &events, "shop").unwrap();
        let timeline = &binlogs["orders"].timelines[&vec![Value::Int(2)]];

        // Absent before insertion and again after deletion.
        assert_eq!(
            timeline.as_of(50.0, MultiChangePolicy::TakeFirst).unwrap(),
            AsOf::Absent
        );
        assert_eq!(
            timeline.as_of(150.0, MultiChangePolicy::TakeFirst).unwrap(),
            AsOf::Row(&[Value::Int(2), Value::Str("new".into())])
        );
        assert_eq!(
            timeline.as_of(150_000.0, MultiChangePolicy::TakeFirst).unwrap(),
            AsOf::NoRecord
        );
    }

    #[test]
    fn test_build_rejects_primary_key_mutation() {
        let events = vec![update(100, image(1, "new"), image(2, "new"))];
        assert!(matches!(
            build_binlogs(&orders_directory(), &events, "shop"),
            Err(JoinError::PrimaryKeyChanged { .. })
        ));
    }

    #[test]
    fn test_build_rejects_discontinuity() {
        let events = vec![
            update(100, image(1, "new"), image(1, "paid")),
            update(200, image(1, "new"), image(1, "shipped")),
        ];
        assert!(matches!(
            build_binlogs(&orders_directory(), &events, "shop"),
            Err(JoinError::Discontinuity { .. })
        ));
    }

    #[test]
    fn test_build_rejects_timestamp_regression() {
        let events = vec![
            update(200, image(1, "new"), image(1, "paid")),
            update(100, image(1, "paid"), image(1, "shipped")),
        ];
        assert!(matches!(
            build_binlogs(&orders_directory(), &events, "shop"),
            Err(JoinError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn test_build_rejects_unknown_column() {
        let mut bad = image(1, "new");
        bad.remove("status");
        bad.insert("colour".into(), Value::Str("red".into()));
        let events = vec![update(100, image(1, "new"), bad)];
        assert!(matches!(
            build_binlogs(&orders_directory(), &events, "shop"),
            Err(JoinError::KeySetMismatch { .. } | JoinError::UnknownBinlogColumn { .. })
        ));
    }

    #[test]
    fn test_build_skips_composite_key_tables() {
        let mut directory = orders_directory();
        directory.get_mut("orders").unwrap().primary_keys =
            vec!["id".into(), "status".into()];
        let events = vec![update(100, image(1, "new"), image(1, "paid"))];
        let binlogs = build_binlogs(&directory, &events, "shop").unwrap();
        assert!(binlogs.is_empty());
    }

    #[test]
    fn test_build_rejects_unlisted_table() {
        let events = vec![BinlogEvent {
            kind: ChangeKind::Insert,
            database: "shop".into(),
            table: "ghosts".into(),
            timestamp: 100,
            rows: vec![BinlogRow {
                before: None,
                after: Some(image(1, "boo")),
            }],
        }];
        assert!(matches!(
            build_binlogs(&orders_directory(), &events, "shop"),
            Err(JoinError::UnknownBinlogTable(_))
        ));
    }
}
