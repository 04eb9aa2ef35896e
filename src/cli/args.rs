//! CLI argument definitions using clap
//!
//! Commands:
//! - snapshot-relay serve [--config <path>] [--database-url <url> | --memory-store] [--port <n>] [--dev-proxy <url>]
//! - snapshot-relay migrate --database-url <url>

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// snapshot-relay - pushes database snapshots to browsers over SSE
#[derive(Parser, Debug)]
#[command(name = "snapshot-relay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay loop and the HTTP server
    Serve(ServeArgs),

    /// Create the watched tables and their change notification triggers
    Migrate {
        /// Postgres connection string
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,

        /// Notification channel raised by the triggers
        #[arg(long, default_value = "data_changed")]
        channel: String,
    },
}

/// Options for `serve`. Anything given here overrides the config file.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Path to a JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Serve from an empty in-process store instead of Postgres
    #[arg(long)]
    pub memory_store: bool,

    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Frontend development server to proxy unmatched paths to
    #[arg(long = "dev-proxy", env = "DEV_PROXY_URL")]
    pub dev_proxy_url: Option<String>,

    /// Log level or filter directive
    #[arg(long, env = "RELAY_LOG", default_value = "info")]
    pub log_level: String,

    /// Log output format: compact or json
    #[arg(long, env = "RELAY_LOG_FORMAT", default_value = "compact")]
    pub log_format: String,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
