use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use vigil::cli::{Cli, Command, ForgetArgs, ResultsArgs, RunArgs};
use vigil::config::{self, Config, ConfigError, ConfigSource};
use vigil::dispatcher::{self, Dispatcher};
use vigil::engine::SqliteEngine;
use vigil::error::{Error, Result};
use vigil::monitor::QueryPerformance;
use vigil::report::{self, FilesystemLogger, SinkError};
use vigil::scheduler::{QueryLauncher, SchedulerRunner};
use vigil::store::{self, ResultStore};
use vigil::{logging, platform};

fn open_store(config: &Config) -> Result<ResultStore> {
    let path = match &config.database_path {
        Some(path) => path.clone(),
        None => store::default_db_path()?,
    };
    Ok(ResultStore::open(&path)?)
}

fn log_dir(config: &Config) -> Result<PathBuf> {
    match &config.logger_path {
        Some(path) => Ok(path.clone()),
        None => Ok(store::data_dir()?.join("logs")),
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let level = if args.verbose { "debug" } else { "info" };
    logging::init(level, args.json_logs);

    let mut config = Config::load(&args.config)?;
    if let Some(timeout) = args.timeout {
        config.schedule_timeout = timeout;
    }
    if let Some(tick) = &args.tick {
        let tick = config::parse_duration(tick)?;
        if tick.is_zero() {
            return Err(ConfigError::ZeroTick.into());
        }
        config.tick = tick;
    }
    config.enable_monitor |= args.monitor;

    let engine_path = config
        .engine_database
        .clone()
        .ok_or(Error::NoEngineDatabase)?;
    let engine = SqliteEngine::open(&engine_path).map_err(|source| Error::EngineOpen {
        path: engine_path.clone(),
        source,
    })?;

    let store = Arc::new(open_store(&config)?);
    let results_dir = log_dir(&config)?;
    let sink = Arc::new(FilesystemLogger::open(&results_dir)?);
    let host = platform::host_identifier(&config.host_identifier, &store)?;

    let performance = Arc::new(QueryPerformance::new());
    let launcher = QueryLauncher::new(Arc::new(engine), store, sink, host.clone())
        .with_collector(performance.clone());
    let source = Arc::new(ConfigSource::new(config.schedule(config::process_seed())));
    let runner = Arc::new(SchedulerRunner::new(
        config.scheduler_config(),
        source,
        Arc::new(launcher),
    ));

    info!(
        host = %host,
        queries = config.queries.len(),
        source = %engine_path.display(),
        results = %results_dir.display(),
        "starting vigil"
    );

    let dispatcher = Arc::new(Dispatcher::new());
    let signals = Arc::clone(&dispatcher);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signals.stop_services();
        }
    });

    dispatcher::start_scheduler_and_wait(&dispatcher, runner).await?;

    if config.enable_monitor {
        for (name, stats) in performance.snapshot() {
            info!(
                query = %name,
                executions = stats.executions,
                wall_time_ms = stats.wall_time.as_millis() as u64,
                output_size = stats.output_size,
                average_memory = stats.average_memory,
                peak_memory_delta = stats.peak_memory_delta,
                "query performance"
            );
        }
    }

    Ok(())
}

fn results(args: ResultsArgs) -> Result<()> {
    logging::init("warn", false);
    let config = Config::load(&args.config)?;
    let store = open_store(&config)?;

    match args.name.as_deref().filter(|_| !args.list) {
        Some(name) => {
            let Some(rows) = store.get(name)? else {
                eprintln!("No stored results for '{name}'.");
                std::process::exit(1);
            };
            if args.json {
                let text = report::json::render_results(&rows).map_err(SinkError::from)?;
                println!("{text}");
            } else {
                print!("{}", report::table::render_results(&rows));
            }
        }
        None => {
            let stored = store.list()?;
            if args.json {
                let text = serde_json::to_string_pretty(&stored).map_err(SinkError::from)?;
                println!("{text}");
            } else {
                print!("{}", report::table::render_list(&stored));
            }
        }
    }

    Ok(())
}

fn forget(args: ForgetArgs) -> Result<()> {
    logging::init("warn", false);
    let config = Config::load(&args.config)?;
    let store = open_store(&config)?;

    if store.remove(&args.name)? {
        println!("Forgot stored results for '{}'.", args.name);
    } else {
        println!("No stored results for '{}'.", args.name);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let outcome = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Results(args) => results(args),
        Command::Forget(args) => forget(args),
    };

    if let Err(e) = outcome {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
