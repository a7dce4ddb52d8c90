//! Row, result set and log record types.
//!
//! A row is a column name to string value map. Columns are kept sorted so two
//! rows with the same columns and values compare equal regardless of the order
//! the engine produced them in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Row = BTreeMap<String, String>;

/// Rows from one execution, in engine order. Duplicates are allowed.
pub type ResultSet = Vec<Row>;

/// Rows that appeared and disappeared between two executions of a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResults {
    pub added: ResultSet,
    pub removed: ResultSet,
}

impl DiffResults {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Payload of a log record: either a differential or a full snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryResults {
    DiffResults(DiffResults),
    Snapshot(ResultSet),
}

/// One emitted record. Built per execution and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryLogItem {
    pub name: String,
    pub host_identifier: String,
    pub calendar_time: String,
    pub unix_time: i64,
    #[serde(flatten)]
    pub results: QueryResults,
}

impl QueryLogItem {
    pub fn new(name: &str, host_identifier: &str, now: DateTime<Utc>, results: QueryResults) -> Self {
        QueryLogItem {
            name: name.to_string(),
            host_identifier: host_identifier.to_string(),
            calendar_time: ascii_time(now),
            unix_time: now.timestamp(),
            results,
        }
    }
}

/// asctime-style timestamp, e.g. "Wed Sep 21 10:27:52 2011 UTC".
pub fn ascii_time(now: DateTime<Utc>) -> String {
    now.format("%a %b %e %H:%M:%S %Y UTC").to_string()
}

/// Bytes of column names plus values across all rows.
pub fn output_size(rows: &[Row]) -> usize {
    rows.iter()
        .flat_map(|row| row.iter())
        .map(|(column, value)| column.len() + value.len())
        .sum()
}

/// Build a row from column/value pairs. Mostly for tests and fakes.
pub fn row<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Row
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
