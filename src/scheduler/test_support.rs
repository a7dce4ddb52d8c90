//! Fakes for scheduler and launcher tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::{QueryOptions, ScheduledQuery};
use crate::engine::{ExecutionError, QueryEngine};
use crate::monitor::{PerformanceCollector, ResourceSample};
use crate::query::{QueryLogItem, ResultSet};
use crate::report::{LogSink, SinkError};

/// Engine that replays scripted results per query text. Once a script runs
/// out, the last result keeps being returned.
#[derive(Default)]
pub struct ScriptedEngine {
    scripts: Mutex<HashMap<String, VecDeque<Result<ResultSet, String>>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, query: &str, result: Result<ResultSet, &str>) {
        self.scripts
            .lock()
            .entry(query.to_string())
            .or_default()
            .push_back(result.map_err(str::to_string));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl QueryEngine for ScriptedEngine {
    fn execute(&self, query: &str) -> Result<ResultSet, ExecutionError> {
        self.calls.lock().push(query.to_string());

        let mut scripts = self.scripts.lock();
        let script = scripts.entry(query.to_string()).or_default();
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };

        match next {
            Some(Ok(rows)) => Ok(rows),
            Some(Err(message)) => Err(ExecutionError::new(query, message)),
            None => Ok(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Results,
    Snapshot,
}

#[derive(Default)]
pub struct RecordingSink {
    items: Mutex<Vec<(Channel, QueryLogItem)>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(RecordingSink {
            items: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn items(&self) -> Vec<(Channel, QueryLogItem)> {
        self.items.lock().clone()
    }

    fn push(&self, channel: Channel, item: &QueryLogItem) -> Result<(), SinkError> {
        self.items.lock().push((channel, item.clone()));
        if self.fail {
            return Err(SinkError::Io(std::io::Error::other("sink down")));
        }
        Ok(())
    }
}

impl LogSink for RecordingSink {
    fn log_results(&self, item: &QueryLogItem) -> Result<(), SinkError> {
        self.push(Channel::Results, item)
    }

    fn log_snapshot(&self, item: &QueryLogItem) -> Result<(), SinkError> {
        self.push(Channel::Snapshot, item)
    }
}

#[derive(Default)]
pub struct CountingCollector {
    pub records: Mutex<Vec<(String, usize)>>,
}

impl PerformanceCollector for CountingCollector {
    fn record(
        &self,
        name: &str,
        _elapsed: Duration,
        output_size: usize,
        _before: &ResourceSample,
        _after: &ResourceSample,
    ) {
        self.records.lock().push((name.to_string(), output_size));
    }
}

pub fn scheduled(query: &str, interval: u64) -> ScheduledQuery {
    ScheduledQuery {
        query: query.to_string(),
        interval,
        splayed_interval: interval,
        options: QueryOptions::default(),
    }
}
