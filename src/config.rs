//! Config file loading and the live schedule.
//!
//! The config file is TOML with an `[options]` table and one
//! `[schedule.<name>]` table per query. Queries keep file order, which is the
//! order they run in when several are due on the same tick.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::scheduler::SchedulerConfig;

pub const DEFAULT_SPLAY_PERCENT: u64 = 10;
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid duration {value:?}: {source}")]
    Duration {
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("query {name}: {reason}")]
    Query { name: String, reason: String },
    #[error("schedule_splay_percent must be at most 100, got {0}")]
    SplayPercent(u64),
    #[error("tick must be longer than zero")]
    ZeroTick,
}

/// How the host is named in log records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostIdentifier {
    Hostname,
    /// Generated once and kept in the result store.
    Uuid,
    Literal(String),
}

impl HostIdentifier {
    fn parse(value: &str) -> Self {
        match value {
            "hostname" => HostIdentifier::Hostname,
            "uuid" => HostIdentifier::Uuid,
            other => HostIdentifier::Literal(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Log the full result set every run instead of a differential.
    pub snapshot: bool,
    /// Report removed rows in differentials.
    pub removed: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            snapshot: false,
            removed: true,
        }
    }
}

/// A query as declared in the config file, before splay is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDefinition {
    pub query: String,
    pub interval: u64,
    pub options: QueryOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledQuery {
    pub query: String,
    pub interval: u64,
    /// Interval in ticks after per-name jitter. Always at least 1.
    pub splayed_interval: u64,
    pub options: QueryOptions,
}

pub type Schedule = IndexMap<String, ScheduledQuery>;

#[derive(Debug)]
pub struct Config {
    pub host_identifier: HostIdentifier,
    pub enable_monitor: bool,
    pub schedule_timeout: u64,
    pub splay_percent: u64,
    pub splay_seed: Option<u64>,
    pub tick: Duration,
    pub database_path: Option<PathBuf>,
    pub logger_path: Option<PathBuf>,
    pub engine_database: Option<PathBuf>,
    pub queries: IndexMap<String, QueryDefinition>,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    options: RawOptions,
    #[serde(default)]
    schedule: IndexMap<String, RawQuery>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawOptions {
    host_identifier: String,
    enable_monitor: bool,
    schedule_timeout: u64,
    schedule_splay_percent: u64,
    splay_seed: Option<u64>,
    tick: Option<String>,
    database_path: Option<PathBuf>,
    logger_path: Option<PathBuf>,
    engine_database: Option<PathBuf>,
}

impl Default for RawOptions {
    fn default() -> Self {
        RawOptions {
            host_identifier: "hostname".to_string(),
            enable_monitor: false,
            schedule_timeout: 0,
            schedule_splay_percent: DEFAULT_SPLAY_PERCENT,
            splay_seed: None,
            tick: None,
            database_path: None,
            logger_path: None,
            engine_database: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawQuery {
    query: String,
    interval: RawInterval,
    #[serde(default)]
    snapshot: bool,
    #[serde(default = "default_removed")]
    removed: bool,
}

fn default_removed() -> bool {
    true
}

/// Whole seconds, or a humantime string such as "5m".
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawInterval {
    Seconds(u64),
    Text(String),
}

pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|source| ConfigError::Duration {
        value: value.to_string(),
        source,
    })
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text)?;
        let options = raw.options;

        if options.schedule_splay_percent > 100 {
            return Err(ConfigError::SplayPercent(options.schedule_splay_percent));
        }

        let tick = match options.tick.as_deref() {
            Some(value) => parse_duration(value)?,
            None => DEFAULT_TICK,
        };
        if tick.is_zero() {
            return Err(ConfigError::ZeroTick);
        }

        let mut queries = IndexMap::new();
        for (name, query) in raw.schedule {
            let definition = query_definition(&name, query)?;
            queries.insert(name, definition);
        }

        Ok(Config {
            host_identifier: HostIdentifier::parse(&options.host_identifier),
            enable_monitor: options.enable_monitor,
            schedule_timeout: options.schedule_timeout,
            splay_percent: options.schedule_splay_percent,
            splay_seed: options.splay_seed,
            tick,
            database_path: options.database_path,
            logger_path: options.logger_path,
            engine_database: options.engine_database,
            queries,
        })
    }

    /// Build the schedule with every interval splayed. `process_seed` is used
    /// unless the config pins `splay_seed`.
    pub fn schedule(&self, process_seed: u64) -> Schedule {
        let seed = self.splay_seed.unwrap_or(process_seed);
        self.queries
            .iter()
            .map(|(name, definition)| {
                let scheduled = ScheduledQuery {
                    query: definition.query.clone(),
                    interval: definition.interval,
                    splayed_interval: splay_interval(
                        name,
                        definition.interval,
                        self.splay_percent,
                        seed,
                    ),
                    options: definition.options,
                };
                (name.clone(), scheduled)
            })
            .collect()
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            timeout: self.schedule_timeout,
            tick: self.tick,
            enable_monitor: self.enable_monitor,
            start_tick: None,
        }
    }
}

fn query_definition(name: &str, raw: RawQuery) -> Result<QueryDefinition, ConfigError> {
    let invalid = |reason: &str| ConfigError::Query {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if raw.query.trim().is_empty() {
        return Err(invalid("query text is empty"));
    }

    let interval = match raw.interval {
        RawInterval::Seconds(secs) => secs,
        RawInterval::Text(text) => parse_duration(&text)?.as_secs(),
    };
    if interval == 0 {
        return Err(invalid("interval must be at least 1 second"));
    }

    Ok(QueryDefinition {
        query: raw.query,
        interval,
        options: QueryOptions {
            snapshot: raw.snapshot,
            removed: raw.removed,
        },
    })
}

/// Jitter `interval` by up to `percent` either way, derived from the query name
/// so queries sharing an interval spread out instead of firing together.
///
/// The same name, interval and seed always give the same result.
pub fn splay_interval(name: &str, interval: u64, percent: u64, seed: u64) -> u64 {
    let max_splay = interval.saturating_mul(percent.min(100)) / 100;
    if max_splay == 0 {
        return interval.max(1);
    }

    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(interval.to_le_bytes());
    hasher.update(seed.to_le_bytes());
    let digest = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let offset = u64::from_le_bytes(head) % (max_splay * 2 + 1);

    (interval - max_splay).saturating_add(offset).max(1)
}

/// Seed for splay when the config does not pin one: process start time.
pub fn process_seed() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Where the scheduler reads its schedule from each tick.
pub trait ScheduleSource: Send + Sync {
    /// Point-in-time view. Later changes to the source do not affect it.
    fn snapshot(&self) -> Arc<Schedule>;
}

/// Schedule holder that can be swapped wholesale on config reload.
pub struct ConfigSource {
    schedule: RwLock<Arc<Schedule>>,
}

impl ConfigSource {
    pub fn new(schedule: Schedule) -> Self {
        ConfigSource {
            schedule: RwLock::new(Arc::new(schedule)),
        }
    }

    pub fn replace(&self, schedule: Schedule) {
        *self.schedule.write() = Arc::new(schedule);
    }
}

impl ScheduleSource for ConfigSource {
    fn snapshot(&self) -> Arc<Schedule> {
        Arc::clone(&self.schedule.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [options]
        host_identifier = "uuid"
        enable_monitor = true
        schedule_timeout = 25
        schedule_splay_percent = 0
        tick = "250ms"
        database_path = "/tmp/vigil.db"

        [schedule.processes]
        query = "SELECT pid, name FROM processes"
        interval = 10

        [schedule.users]
        query = "SELECT uid FROM users"
        interval = "5m"
        snapshot = true

        [schedule.mounts]
        query = "SELECT path FROM mounts"
        interval = 60
        removed = false
    "#;

    #[test]
    fn parses_options_and_queries() {
        let config = Config::from_toml(SAMPLE).unwrap();

        assert_eq!(config.host_identifier, HostIdentifier::Uuid);
        assert!(config.enable_monitor);
        assert_eq!(config.schedule_timeout, 25);
        assert_eq!(config.tick, Duration::from_millis(250));
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/vigil.db")));

        let users = &config.queries["users"];
        assert_eq!(users.interval, 300);
        assert!(users.options.snapshot);
        assert!(users.options.removed);

        let mounts = &config.queries["mounts"];
        assert!(!mounts.options.snapshot);
        assert!(!mounts.options.removed);
    }

    #[test]
    fn schedule_keeps_file_order() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let schedule = config.schedule(0);
        let names: Vec<&String> = schedule.keys().collect();
        assert_eq!(names, vec!["processes", "users", "mounts"]);
    }

    #[test]
    fn defaults_apply_to_empty_config() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.host_identifier, HostIdentifier::Hostname);
        assert!(!config.enable_monitor);
        assert_eq!(config.schedule_timeout, 0);
        assert_eq!(config.splay_percent, DEFAULT_SPLAY_PERCENT);
        assert_eq!(config.tick, DEFAULT_TICK);
        assert!(config.queries.is_empty());
    }

    #[test]
    fn literal_host_identifier() {
        let config = Config::from_toml("[options]\nhost_identifier = \"db-7\"").unwrap();
        assert_eq!(config.host_identifier, HostIdentifier::Literal("db-7".into()));
    }

    #[test]
    fn zero_interval_rejected() {
        let err = Config::from_toml("[schedule.q]\nquery = \"SELECT 1\"\ninterval = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Query { ref name, .. } if name == "q"));
    }

    #[test]
    fn empty_query_rejected() {
        let err = Config::from_toml("[schedule.q]\nquery = \"  \"\ninterval = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Query { .. }));
    }

    #[test]
    fn splay_percent_over_100_rejected() {
        let err = Config::from_toml("[options]\nschedule_splay_percent = 101").unwrap_err();
        assert!(matches!(err, ConfigError::SplayPercent(101)));
    }

    #[test]
    fn bad_duration_rejected() {
        let err = Config::from_toml("[options]\ntick = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Duration { .. }));
    }

    #[test]
    fn zero_splay_keeps_interval() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let schedule = config.schedule(42);
        assert_eq!(schedule["processes"].splayed_interval, 10);
        assert_eq!(schedule["users"].splayed_interval, 300);
    }

    #[test]
    fn splay_is_deterministic() {
        let a = splay_interval("processes", 3600, 10, 7);
        let b = splay_interval("processes", 3600, 10, 7);
        assert_eq!(a, b);
    }

    #[test]
    fn splay_stays_within_percent() {
        for i in 0..200 {
            let name = format!("query_{i}");
            let splayed = splay_interval(&name, 100, 10, 99);
            assert!((90..=110).contains(&splayed), "{name}: {splayed}");
        }
    }

    #[test]
    fn splay_varies_by_name() {
        let mut seen: Vec<u64> = (0..20)
            .map(|i| splay_interval(&format!("query_{i}"), 100, 10, 1))
            .collect();
        seen.sort();
        seen.dedup();
        assert!(seen.len() > 1);
    }

    #[test]
    fn splay_never_reaches_zero() {
        for seed in 0..50 {
            assert!(splay_interval("q", 1, 100, seed) >= 1);
        }
    }

    #[test]
    fn pinned_seed_overrides_process_seed() {
        let text = "[options]\nsplay_seed = 5\n[schedule.q]\nquery = \"SELECT 1\"\ninterval = 1000";
        let config = Config::from_toml(text).unwrap();
        assert_eq!(config.schedule(1), config.schedule(2));
    }

    #[test]
    fn config_source_swaps_wholesale() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let source = ConfigSource::new(config.schedule(0));

        let before = source.snapshot();
        source.replace(Schedule::new());

        assert_eq!(before.len(), 3);
        assert!(source.snapshot().is_empty());
    }
}
