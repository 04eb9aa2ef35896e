//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero exit code.

use std::fmt;
use std::io;

use crate::realtime::RealtimeError;
use crate::store::StoreError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file or flag error
    ConfigError,
    /// I/O error
    IoError,
    /// Store could not be reached or migrated
    StoreUnavailable,
    /// Boot failed
    BootFailed,
    /// Relay loop ended while serving
    RelayStopped,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "RELAY_CLI_CONFIG_ERROR",
            Self::IoError => "RELAY_CLI_IO_ERROR",
            Self::StoreUnavailable => "RELAY_CLI_STORE_UNAVAILABLE",
            Self::BootFailed => "RELAY_CLI_BOOT_FAILED",
            Self::RelayStopped => "RELAY_CLI_RELAY_STOPPED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    /// I/O error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    /// Store unavailable
    pub fn store_unavailable(e: StoreError) -> Self {
        Self::new(CliErrorCode::StoreUnavailable, e.to_string())
    }

    /// Boot failed
    pub fn boot_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::BootFailed, msg)
    }

    /// Relay loop stopped
    pub fn relay_stopped(e: RealtimeError) -> Self {
        Self::new(CliErrorCode::RelayStopped, e.to_string())
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::config_error(format!("Invalid config JSON: {}", e))
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
