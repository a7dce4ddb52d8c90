//! JSON output for log records and stored results.
//!
//! One record per line, so result logs can be tailed and shipped line by line.

use crate::query::{QueryLogItem, ResultSet};

pub fn render(item: &QueryLogItem) -> serde_json::Result<String> {
    serde_json::to_string(item)
}

pub fn render_results(results: &ResultSet) -> serde_json::Result<String> {
    serde_json::to_string_pretty(results)
}
