//! Logging setup
//!
//! Installs a `tracing-subscriber` fmt subscriber. Output is compact text by
//! default or JSON lines (one event per line) for log shippers. `RUST_LOG`,
//! when set, takes precedence over the configured level.

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// `timestamp LEVEL target: message fields`
    #[default]
    Compact,
    /// JSON lines
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(LogFormat::Compact),
            "json" | "jsonl" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Dependencies that are chatty at debug level
const QUIET_TARGETS: &[(&str, &str)] = &[
    ("hyper", "warn"),
    ("hyper_util", "warn"),
    ("tokio_postgres", "info"),
    ("reqwest", "warn"),
    ("tower_http", "info"),
];

/// Build the filter from a base level plus the quieted dependencies.
pub fn build_env_filter(level: &str) -> Result<EnvFilter, String> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut directives = vec![level.to_string()];
    for (target, lvl) in QUIET_TARGETS {
        directives.push(format!("{}={}", target, lvl));
    }

    let filter = directives.join(",");
    EnvFilter::try_new(&filter).map_err(|e| format!("invalid log filter '{}': {}", filter, e))
}

/// Install the global subscriber.
///
/// Calling it twice is harmless; the first installation wins.
pub fn init_logging(level: &str, format: LogFormat) -> Result<(), String> {
    let filter = build_env_filter(level)?;

    let installed = match format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(false)
            .try_init(),
    };

    if installed.is_ok() {
        tracing::debug!(level, ?format, "logging initialized");
    }
    Ok(())
}
