use tracing_subscriber::{fmt, EnvFilter};

/// Install the global diagnostics subscriber.
///
/// `RUST_LOG` wins when set, otherwise `default_level` is used (e.g. "info",
/// "vigil=debug,warn"). Later calls are no-ops, so tests may call it freely.
pub fn init(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init()
            .ok();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init()
            .ok();
    }

    tracing::debug!(json, "logging initialised");
}
