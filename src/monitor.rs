//! Resource usage of scheduled queries.
//!
//! When the monitor is enabled each execution is bracketed by a memory sample
//! of this process, and the pair is handed to a [`PerformanceCollector`] with
//! the wall time and output size. Recording is best effort: a missing sample
//! skips the record and never affects how results are handled.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

/// Memory use of this process at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSample {
    pub physical_bytes: usize,
    pub virtual_bytes: usize,
}

impl ResourceSample {
    /// Sample the current process, if the platform supports it.
    pub fn current() -> Option<Self> {
        memory_stats::memory_stats().map(|stats| ResourceSample {
            physical_bytes: stats.physical_mem,
            virtual_bytes: stats.virtual_mem,
        })
    }
}

pub trait PerformanceCollector: Send + Sync {
    fn record(
        &self,
        name: &str,
        elapsed: Duration,
        output_size: usize,
        before: &ResourceSample,
        after: &ResourceSample,
    );
}

/// Running totals for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryStats {
    pub executions: u64,
    pub last_executed: i64,
    pub wall_time: Duration,
    pub output_size: u64,
    /// Mean resident memory after execution, in bytes.
    pub average_memory: u64,
    /// Largest resident memory growth seen across one execution, in bytes.
    pub peak_memory_delta: i64,
}

/// In-process [`PerformanceCollector`] keyed by query name.
#[derive(Default)]
pub struct QueryPerformance {
    stats: Mutex<HashMap<String, QueryStats>>,
}

impl QueryPerformance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<QueryStats> {
        self.stats.lock().get(name).cloned()
    }

    /// All stats, sorted by query name.
    pub fn snapshot(&self) -> Vec<(String, QueryStats)> {
        let mut all: Vec<_> = self
            .stats
            .lock()
            .iter()
            .map(|(name, stats)| (name.clone(), stats.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

impl PerformanceCollector for QueryPerformance {
    fn record(
        &self,
        name: &str,
        elapsed: Duration,
        output_size: usize,
        before: &ResourceSample,
        after: &ResourceSample,
    ) {
        let mut stats = self.stats.lock();
        let entry = stats.entry(name.to_string()).or_default();

        let after_bytes = after.physical_bytes as u64;
        let delta = after.physical_bytes as i64 - before.physical_bytes as i64;

        // incremental mean, executions is the count before this one
        entry.average_memory = (entry.average_memory * entry.executions + after_bytes)
            / (entry.executions + 1);
        entry.executions += 1;
        entry.last_executed = chrono::Utc::now().timestamp();
        entry.wall_time += elapsed;
        entry.output_size += output_size as u64;
        entry.peak_memory_delta = entry.peak_memory_delta.max(delta);

        tracing::debug!(
            query = name,
            elapsed_ms = elapsed.as_millis() as u64,
            output_size,
            memory_delta = delta,
            "recorded query performance"
        );
    }
}
