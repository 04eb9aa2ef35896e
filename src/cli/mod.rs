//! CLI module for snapshot-relay
//!
//! Provides command-line interface for:
//! - serve: Run the relay loop and the HTTP server
//! - migrate: Install the watched tables and their notify triggers

mod args;
mod commands;
mod config;
mod errors;

pub use args::{Cli, Command, ServeArgs};
pub use commands::{migrate, open_store, run, run_command, serve, serve_until, serve_with_store};
pub use config::{ConfigOverrides, RelayConfig};
pub use errors::{CliError, CliErrorCode, CliResult};
