//! Whole-batch join orchestration.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashSet;
use tracing::warn;

use logweave_core::{Dump, Relation, RelationKind, Table, Value, LOG_NAMESPACE};

use crate::back_project::table_to_records;
use crate::binlog::TableBinlog;
use crate::config::JoinConfig;
use crate::error::JoinResult;
use crate::join::{join_foreign_key, join_nearest_before};

/// One candidate foreign-key relationship between a log column and a
/// target table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeySpec {
    /// Namespaced source table.
    pub from_table: String,
    /// Expanded source column.
    pub from_column: String,
    /// Namespaced target table.
    pub to_table: String,
    /// Expanded target column.
    pub to_column: String,
}

/// Output of [`join_all`]: nested records and joined tables, both keyed by
/// the un-namespaced log table (API) name respectively the full table
/// name.
#[derive(Debug, Clone, Default)]
pub struct JoinAllOutput {
    /// Back-projected nested records per API.
    pub logs: BTreeMap<String, Vec<Value>>,
    /// Joined columnar tables, keyed by namespaced name.
    pub tables: BTreeMap<String, Table>,
}

/// Runs every join over every `log::` table of the dump and back-projects
/// the results.
///
/// Candidate foreign keys sourced from `log_data.response.*` columns are
/// dropped (responses describe effects, not references). Each (target
/// table, column) pair is uniqueness-checked once per run; a duplicated
/// or empty target disables that pair for the whole batch. Repeated
/// target tables within one source table get `#0`, `#1`… alias suffixes.
/// Individual join failures, including candidates that reference a
/// missing table or column, are logged and skipped; back-projection
/// failures are fatal.
///
/// # Errors
///
/// Fails when back-projection of a joined table fails.
pub fn join_all(
    dump: &Dump,
    foreign_keys: &[ForeignKeySpec],
    dataflow: &BTreeMap<String, Vec<String>>,
    binlogs: &BTreeMap<String, TableBinlog>,
    config: &JoinConfig,
) -> JoinResult<JoinAllOutput> {
    let mut non_unique: BTreeSet<(&str, &str)> = BTreeSet::new();
    let mut output = JoinAllOutput::default();

    for table in &dump.tables {
        let Some(api_name) = table.name.strip_prefix(LOG_NAMESPACE) else {
            continue;
        };

        let candidates: Vec<&ForeignKeySpec> = foreign_keys
            .iter()
            .filter(|fk| {
                fk.from_table == table.name && !fk.from_column.contains("log_data.response.")
            })
            .collect();

        let mut seen_targets = BTreeSet::new();
        let mut dup_targets = BTreeSet::new();
        for fk in &candidates {
            if !seen_targets.insert(fk.to_table.as_str()) {
                dup_targets.insert(fk.to_table.as_str());
            }
        }

        let mut working = table.clone();
        let mut dup_counters: BTreeMap<&str, usize> = BTreeMap::new();

        for fk in candidates {
            if non_unique.contains(&(fk.to_table.as_str(), fk.to_column.as_str())) {
                continue;
            }

            let target = dump
                .table(&fk.to_table)
                .and_then(|t| t.expanded_column(&fk.to_column));
            let to_values = match target {
                Ok(column) => &column.values,
                Err(err) => {
                    warn!(
                        left = %working.name,
                        right = %fk.to_table,
                        error = %err,
                        "foreign-key target missing, skipping"
                    );
                    continue;
                }
            };
            let non_null: Vec<&Value> = to_values.iter().filter(|v| !v.is_null()).collect();
            let distinct: FxHashSet<&Value> = non_null.iter().copied().collect();
            if non_null.is_empty() || non_null.len() != distinct.len() {
                non_unique.insert((fk.to_table.as_str(), fk.to_column.as_str()));
                continue;
            }

            let to_base = fk
                .to_table
                .split_once("::")
                .map_or(fk.to_table.as_str(), |(_, rest)| rest);
            let to_name = if dup_targets.contains(fk.to_table.as_str()) {
                let counter = dup_counters.entry(fk.to_table.as_str()).or_insert(0);
                let name = format!("{to_base}#{counter}");
                *counter += 1;
                name
            } else {
                to_base.to_owned()
            };

            let relation = Relation {
                kind: RelationKind::ForeignKey,
                left_table: working.name.clone(),
                left_column: fk.from_column.clone(),
                right_table: fk.to_table.clone(),
                right_column: fk.to_column.clone(),
                back_name: to_name.clone(),
            };
            if let Err(err) = join_foreign_key(
                &mut working,
                dump,
                &relation,
                &format!("{to_name}@"),
                binlogs.get(to_base),
                config,
            ) {
                warn!(
                    left = %working.name,
                    right = %fk.to_table,
                    error = %err,
                    "foreign-key join failed, skipping"
                );
            }
        }

        let edges: BTreeSet<&String> = dataflow
            .get(api_name)
            .map(|edges| edges.iter().collect())
            .unwrap_or_default();
        for edge in edges {
            let relation = Relation {
                kind: RelationKind::NearestBefore,
                left_table: working.name.clone(),
                left_column: String::new(),
                right_table: format!("{LOG_NAMESPACE}{edge}"),
                right_column: String::new(),
                back_name: edge.clone(),
            };
            if let Err(err) = join_nearest_before(
                &mut working,
                dump,
                &relation,
                &format!("{LOG_NAMESPACE}{edge}@"),
                config,
            ) {
                warn!(
                    left = %working.name,
                    right = %edge,
                    error = %err,
                    "nearest-before join failed, skipping"
                );
            }
        }

        let records = table_to_records(&working)?;
        output.logs.insert(api_name.to_owned(), records);
        output.tables.insert(table.name.clone(), working);
    }

    Ok(output)
}
