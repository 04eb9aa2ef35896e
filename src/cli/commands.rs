//! CLI command implementations
//!
//! `serve` boot sequence:
//! 1. Configuration load (file, then flags)
//! 2. Logging
//! 3. Store connection (fatal when unreachable)
//! 4. Change signal source
//! 5. Relay loop task
//! 6. HTTP server
//!
//! The process then runs until ctrl-c or until the relay loop stops, which
//! is fatal because no further refresh could ever happen.

use std::future::Future;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::http_server::{AppContext, HttpServer};
use crate::observability::{init_logging, LogFormat, RelayMetrics};
use crate::realtime::{BroadcastHub, RealtimeError, Relay};
use crate::store::{MemoryStore, PgStore, Store};

use super::args::{Command, ServeArgs};
use super::config::{ConfigOverrides, RelayConfig};
use super::errors::{CliError, CliResult};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve(args) => serve(args),
        Command::Migrate {
            database_url,
            channel,
        } => migrate(&database_url, &channel),
    }
}

/// Run the relay and the HTTP server until ctrl-c.
pub fn serve(args: ServeArgs) -> CliResult<()> {
    let format: LogFormat = args.log_format.parse().map_err(CliError::config_error)?;
    init_logging(&args.log_level, format).map_err(CliError::config_error)?;

    let config = RelayConfig::resolve(
        args.config.as_deref(),
        ConfigOverrides {
            database_url: args.database_url,
            memory_store: args.memory_store,
            port: args.port,
            dev_proxy_url: args.dev_proxy_url,
        },
    )?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(serve_until(config, shutdown_signal()))
}

/// Install the watched tables and their notify triggers.
pub fn migrate(database_url: &str, channel: &str) -> CliResult<()> {
    init_logging("info", LogFormat::Compact).map_err(CliError::config_error)?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        let store = PgStore::connect(database_url, channel)
            .await
            .map_err(CliError::store_unavailable)?;
        store.migrate().await.map_err(CliError::store_unavailable)
    })
}

/// Open the configured store.
///
/// The in-memory store is only used when asked for explicitly.
pub async fn open_store(config: &RelayConfig) -> CliResult<Arc<dyn Store>> {
    if config.memory_store {
        warn!("serving from the in-memory store, nothing is persisted");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| CliError::config_error("database_url is required"))?;
    let store = PgStore::connect(url, &config.notify_channel)
        .await
        .map_err(CliError::store_unavailable)?;
    Ok(Arc::new(store))
}

/// Boot the relay and serve until `shutdown` resolves or the relay stops.
pub async fn serve_until<F>(config: RelayConfig, shutdown: F) -> CliResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = open_store(&config).await?;
    serve_with_store(config, store, shutdown).await
}

/// Same as [`serve_until`] over an already opened store.
pub async fn serve_with_store<F>(
    config: RelayConfig,
    store: Arc<dyn Store>,
    shutdown: F,
) -> CliResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let signals = store
        .listen(config.signal_buffer)
        .await
        .map_err(CliError::store_unavailable)?;

    let hub = BroadcastHub::new(config.hub_config());
    let metrics = Arc::new(RelayMetrics::new());
    let relay = Relay::new(
        Arc::clone(&store),
        hub.clone(),
        config.stream.clone(),
        Arc::clone(&metrics),
    )
    .map_err(|e| CliError::boot_failed(e.to_string()))?;

    let server = HttpServer::new(
        config.http.clone(),
        AppContext {
            store,
            hub: hub.clone(),
            metrics,
            stream: config.stream.clone(),
        },
    );

    info!(
        stream = %config.stream,
        channel = %config.notify_channel,
        overflow_policy = %config.overflow_policy,
        "starting relay"
    );
    let relay_task = tokio::spawn(relay.run(signals));

    // Closing the hub ends every SSE stream so graceful shutdown can finish.
    let closing_hub = hub.clone();
    let shutdown = async move {
        shutdown.await;
        info!("shutdown requested");
        closing_hub.close();
    };

    tokio::select! {
        served = server.start(shutdown) => {
            hub.close();
            served.map_err(|e| CliError::boot_failed(format!("HTTP server failed: {}", e)))
        }
        exit = relay_task => {
            let reason = exit.unwrap_or_else(|e| RealtimeError::Internal(e.to_string()));
            hub.close();
            match reason {
                RealtimeError::HubClosed => Ok(()),
                reason => {
                    error!(error = %reason, "relay loop stopped");
                    Err(CliError::relay_stopped(reason))
                }
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
