//! Log-stream ingestion: grouping raw records by API into tables.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use tracing::warn;

use logweave_core::{Column, Dump, SchemaCatalog, SchemaInducer, Table, Value};

use crate::error::JoinResult;

/// Timestamp layout of raw log records.
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Parses a log timestamp into UTC epoch seconds.
///
/// # Errors
///
/// Fails when `raw` does not match `YYYY-MM-DD HH:MM:SS.ffffff`.
#[allow(clippy::cast_precision_loss)]
pub fn parse_log_time(raw: &str) -> JoinResult<f64> {
    let parsed = NaiveDateTime::parse_from_str(raw, TIME_FORMAT)?;
    Ok(parsed.and_utc().timestamp_micros() as f64 * 1e-6)
}

/// Groups raw log records by their `api` field, injecting the `seq`,
/// `time_parsed`, and `time_response_parsed` columns each record needs
/// downstream.
///
/// Records without an API name are dropped silently; records that fail to
/// parse are logged and dropped.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn logs_by_api(records: &[Value]) -> BTreeMap<String, Vec<Value>> {
    let mut by_api: BTreeMap<String, Vec<Value>> = BTreeMap::new();

    for (seq, record) in records.iter().enumerate() {
        let Some(map) = record.as_object() else {
            warn!(seq, "skipping non-object log record");
            continue;
        };
        let api = map
            .get("api")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if api.is_empty() {
            continue;
        }

        let time_raw = map.get("time").and_then(Value::as_str).unwrap_or_default();
        let time_parsed = match parse_log_time(time_raw) {
            Ok(t) => t,
            Err(err) => {
                warn!(seq, error = %err, "skipping log record with bad time");
                continue;
            }
        };
        let response_raw = map
            .get("response_time")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        let time_response_parsed = match response_raw.map(parse_log_time).transpose() {
            Ok(t) => t.map_or(Value::Null, Value::Float),
            Err(err) => {
                warn!(seq, error = %err, "skipping log record with bad response time");
                continue;
            }
        };

        let mut enriched = map.clone();
        enriched.insert("seq".to_owned(), Value::Int(seq as i64));
        enriched.insert("time_parsed".to_owned(), Value::Float(time_parsed));
        enriched.insert("time_response_parsed".to_owned(), time_response_parsed);

        by_api
            .entry(api.to_owned())
            .or_default()
            .push(Value::Object(enriched));
    }

    by_api
}

/// Builds one single-column (`log_data`) table per API, inducing the
/// schema of each, and the matching catalog entries.
///
/// # Errors
///
/// Fails when schema induction fails for an API's records.
pub fn log_dump(
    records: &[Value],
    inducer: &SchemaInducer,
) -> JoinResult<(Dump, SchemaCatalog)> {
    let mut dump = Dump::default();
    let mut catalog = SchemaCatalog::new();

    for (api, contents) in logs_by_api(records) {
        let schema = inducer.induce(&contents)?;
        catalog.insert(&api, "log_data", schema.clone());
        dump.tables.push(Table::new(
            api,
            vec![Column {
                name: "log_data".into(),
                schema,
                values: contents,
            }],
        )?);
    }

    Ok((dump, catalog))
}

/// Re-materializes log tables under a previously induced catalog: one
/// table per catalog entry, empty when no records carry that API.
///
/// # Errors
///
/// Fails when a catalog table lacks a `log_data` schema.
pub fn log_dump_with_catalog(records: &[Value], catalog: &SchemaCatalog) -> JoinResult<Dump> {
    let mut by_api = logs_by_api(records);
    let mut dump = Dump::default();

    for (api, columns) in &catalog.tables {
        let schema = columns
            .get("log_data")
            .ok_or_else(|| logweave_core::CoreError::ColumnNotFound {
                table: api.clone(),
                column: "log_data".to_owned(),
            })?
            .clone();
        let contents = by_api.remove(api).unwrap_or_default();
        dump.tables.push(Table::new(
            api.clone(),
            vec![Column {
                name: "log_data".into(),
                schema,
                values: contents,
            }],
        )?);
    }

    Ok(dump)
}
