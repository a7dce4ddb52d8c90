//! The scheduler loop.
//!
//! Once per tick the loop takes a snapshot of the schedule and launches every
//! query whose splayed interval divides the tick counter, one after another in
//! schedule order. It then sleeps for the tick quantum, waking early if the
//! cancellation token fires.
//!
//! Queries run on the blocking pool and are awaited before the loop moves on,
//! so a stop request never interrupts a diff-and-store half way.

pub mod launch;
#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;
use std::time::Duration;

use chrono::Timelike;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ScheduleSource, ScheduledQuery};

pub use launch::{LaunchOutcome, QueryLauncher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Last tick to run; 0 runs until stopped.
    pub timeout: u64,
    /// Sleep between ticks.
    pub tick: Duration,
    pub enable_monitor: bool,
    /// First tick counter value. Defaults to the wall clock's seconds-of-minute.
    pub start_tick: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            timeout: 0,
            tick: Duration::from_secs(1),
            enable_monitor: false,
            start_tick: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Whether `query` fires on tick `tick`.
pub fn is_due(tick: u64, query: &ScheduledQuery) -> bool {
    tick % query.splayed_interval.max(1) == 0
}

fn seconds_of_minute() -> u64 {
    u64::from(chrono::Local::now().second())
}

pub struct SchedulerRunner {
    config: SchedulerConfig,
    source: Arc<dyn ScheduleSource>,
    launcher: Arc<QueryLauncher>,
    state: Mutex<SchedulerState>,
}

impl SchedulerRunner {
    pub fn new(
        config: SchedulerConfig,
        source: Arc<dyn ScheduleSource>,
        launcher: Arc<QueryLauncher>,
    ) -> Self {
        SchedulerRunner {
            config,
            source,
            launcher,
            state: Mutex::new(SchedulerState::Idle),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    /// Run until the timeout tick passes or `cancel` fires. Returns the number
    /// of ticks processed. A runner only runs once; later calls return 0.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> u64 {
        {
            let mut state = self.state.lock();
            if *state != SchedulerState::Idle {
                warn!(state = ?*state, "scheduler already started");
                return 0;
            }
            *state = SchedulerState::Running;
        }

        let mut tick = self.config.start_tick.unwrap_or_else(seconds_of_minute);
        let mut processed = 0;
        info!(
            start_tick = tick,
            timeout = self.config.timeout,
            tick_ms = self.config.tick.as_millis() as u64,
            "scheduler started"
        );

        while self.config.timeout == 0 || tick <= self.config.timeout {
            if cancel.is_cancelled() {
                break;
            }

            let schedule = self.source.snapshot();
            for (name, query) in schedule.iter() {
                if is_due(tick, query) {
                    self.launch(name, query).await;
                }
            }
            processed += 1;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.tick) => {}
            }
            tick += 1;
        }

        *self.state.lock() = SchedulerState::Stopped;
        info!(ticks = processed, last_tick = tick, "scheduler stopped");
        processed
    }

    async fn launch(&self, name: &str, query: &ScheduledQuery) {
        let launcher = Arc::clone(&self.launcher);
        let name = name.to_string();
        let query = query.clone();
        let monitor = self.config.enable_monitor;

        let task_name = name.clone();
        match tokio::task::spawn_blocking(move || launcher.launch(&name, &query, monitor)).await {
            Ok(outcome) => debug!(query = %task_name, ?outcome, "query launched"),
            Err(e) => error!(query = %task_name, error = %e, "query launch panicked"),
        }
    }
}
