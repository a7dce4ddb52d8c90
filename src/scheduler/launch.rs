//! Running one scheduled query once.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error};

use crate::config::ScheduledQuery;
use crate::engine::{ExecutionError, QueryEngine};
use crate::monitor::{PerformanceCollector, QueryPerformance, ResourceSample};
use crate::query::{output_size, QueryLogItem, QueryResults, ResultSet};
use crate::report::LogSink;
use crate::store::diff::compute_and_store;
use crate::store::ResultStore;

/// What a single launch ended with. Every failure is already logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// A record was handed to the sink.
    Logged,
    /// Differential run with nothing to report.
    Unchanged,
    ExecutionFailed,
    StorageFailed,
    SinkFailed,
}

/// Executes scheduled queries and routes their results to the store and sink.
pub struct QueryLauncher {
    engine: Arc<dyn QueryEngine>,
    store: Arc<ResultStore>,
    sink: Arc<dyn LogSink>,
    collector: Arc<dyn PerformanceCollector>,
    host_identifier: String,
}

impl QueryLauncher {
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        store: Arc<ResultStore>,
        sink: Arc<dyn LogSink>,
        host_identifier: impl Into<String>,
    ) -> Self {
        QueryLauncher {
            engine,
            store,
            sink,
            collector: Arc::new(QueryPerformance::new()),
            host_identifier: host_identifier.into(),
        }
    }

    pub fn with_collector(mut self, collector: Arc<dyn PerformanceCollector>) -> Self {
        self.collector = collector;
        self
    }

    /// Run `query` once.
    ///
    /// Snapshot queries log every row and leave the store alone. Differential
    /// queries diff against the stored baseline, replace it, and log only when
    /// something changed. With `monitor` set, memory and wall time around the
    /// execution go to the performance collector.
    pub fn launch(&self, name: &str, query: &ScheduledQuery, monitor: bool) -> LaunchOutcome {
        debug!(query = name, sql = %query.query, "executing query");

        let executed = if monitor {
            self.execute_monitored(name, &query.query)
        } else {
            self.engine.execute(&query.query)
        };

        let rows = match executed {
            Ok(rows) => rows,
            Err(e) => {
                error!(query = name, error = %e, "query execution failed");
                return LaunchOutcome::ExecutionFailed;
            }
        };

        let now = Utc::now();

        if query.options.snapshot {
            let item = QueryLogItem::new(
                name,
                &self.host_identifier,
                now,
                QueryResults::Snapshot(rows),
            );
            return match self.sink.log_snapshot(&item) {
                Ok(()) => LaunchOutcome::Logged,
                Err(e) => {
                    error!(query = name, error = %e, "could not log snapshot results");
                    LaunchOutcome::SinkFailed
                }
            };
        }

        let mut diff = match compute_and_store(&self.store, name, &rows) {
            Ok(diff) => diff,
            Err(e) => {
                error!(query = name, error = %e, "could not store new results");
                return LaunchOutcome::StorageFailed;
            }
        };

        if !query.options.removed {
            diff.removed.clear();
        }

        if diff.is_empty() {
            return LaunchOutcome::Unchanged;
        }

        debug!(
            query = name,
            host = %self.host_identifier,
            added = diff.added.len(),
            removed = diff.removed.len(),
            "found results for query"
        );

        let item = QueryLogItem::new(
            name,
            &self.host_identifier,
            now,
            QueryResults::DiffResults(diff),
        );
        match self.sink.log_results(&item) {
            Ok(()) => LaunchOutcome::Logged,
            Err(e) => {
                error!(query = name, error = %e, "could not log query results");
                LaunchOutcome::SinkFailed
            }
        }
    }

    fn execute_monitored(&self, name: &str, sql: &str) -> Result<ResultSet, ExecutionError> {
        let before = ResourceSample::current();
        let started = Instant::now();
        let executed = self.engine.execute(sql);
        let elapsed = started.elapsed();
        let after = ResourceSample::current();

        if let (Ok(rows), Some(before), Some(after)) = (&executed, before, after) {
            self.collector
                .record(name, elapsed, output_size(rows), &before, &after);
        }

        executed
    }
}
