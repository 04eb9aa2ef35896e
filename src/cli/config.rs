//! Relay configuration
//!
//! Loaded from an optional JSON file. Every field has a default, so an
//! empty object (or no file at all) is a valid configuration. Command line
//! flags are applied on top of the file and the result is validated once.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::http_server::HttpServerConfig;
use crate::realtime::{HubConfig, OverflowPolicy, DEFAULT_SUBSCRIBER_BUFFER};
use crate::store::validate_channel_name;

use super::errors::{CliError, CliResult};

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Postgres connection string, required unless `memory_store` is set
    #[serde(default)]
    pub database_url: Option<String>,

    /// Serve from the in-process store instead of Postgres (development only)
    #[serde(default)]
    pub memory_store: bool,

    /// Channel the store raises change signals on (default: "data_changed")
    #[serde(default = "default_notify_channel")]
    pub notify_channel: String,

    /// Hub stream the snapshots are published on (default: "messages")
    #[serde(default = "default_stream")]
    pub stream: String,

    /// Undelivered messages a subscriber may hold (default: 64)
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// What gives way when a subscriber falls behind (default: drop_oldest)
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,

    /// Pending change signals before new ones coalesce (default: 16)
    #[serde(default = "default_signal_buffer")]
    pub signal_buffer: usize,

    /// HTTP server settings
    #[serde(default)]
    pub http: HttpServerConfig,
}

fn default_notify_channel() -> String {
    "data_changed".to_string()
}

fn default_stream() -> String {
    "messages".to_string()
}

fn default_subscriber_buffer() -> usize {
    DEFAULT_SUBSCRIBER_BUFFER
}

fn default_signal_buffer() -> usize {
    16
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            memory_store: false,
            notify_channel: default_notify_channel(),
            stream: default_stream(),
            subscriber_buffer: default_subscriber_buffer(),
            overflow_policy: OverflowPolicy::default(),
            signal_buffer: default_signal_buffer(),
            http: HttpServerConfig::default(),
        }
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub memory_store: bool,
    pub port: Option<u16>,
    pub dev_proxy_url: Option<String>,
}

impl RelayConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::config_error(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        Ok(serde_json::from_str(&content)?)
    }

    /// Load the file when given, apply the overrides and validate.
    pub fn resolve(path: Option<&Path>, overrides: ConfigOverrides) -> CliResult<Self> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Apply command line values on top of the file values
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.database_url {
            self.database_url = Some(url);
        }
        if overrides.memory_store {
            self.memory_store = true;
        }
        if let Some(port) = overrides.port {
            self.http.port = port;
        }
        if let Some(url) = overrides.dev_proxy_url {
            self.http.dev_proxy_url = Some(url);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> CliResult<()> {
        validate_channel_name(&self.notify_channel)
            .map_err(|e| CliError::config_error(e.to_string()))?;

        if self.stream.trim().is_empty() {
            return Err(CliError::config_error("stream must not be empty"));
        }

        if self.subscriber_buffer == 0 {
            return Err(CliError::config_error("subscriber_buffer must be > 0"));
        }

        if self.signal_buffer == 0 {
            return Err(CliError::config_error("signal_buffer must be > 0"));
        }

        if self.http.keep_alive_secs == 0 {
            return Err(CliError::config_error("http.keep_alive_secs must be > 0"));
        }

        if let Some(url) = &self.http.dev_proxy_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(CliError::config_error(format!(
                    "Invalid dev_proxy_url: '{}'. Must start with http:// or https://",
                    url
                )));
            }
        }

        match &self.database_url {
            Some(url) if url.trim().is_empty() => {
                return Err(CliError::config_error("database_url must not be empty"));
            }
            None if !self.memory_store => {
                return Err(CliError::config_error(
                    "database_url is required (use --memory-store for development)",
                ));
            }
            _ => {}
        }

        Ok(())
    }

    /// Hub settings derived from this configuration
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            subscriber_buffer: self.subscriber_buffer,
            overflow_policy: self.overflow_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::errors::CliErrorCode;
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_config(temp_dir: &TempDir, value: serde_json::Value) -> std::path::PathBuf {
        let path = temp_dir.path().join("relay.json");
        fs::write(&path, value.to_string()).unwrap();
        path
    }

    fn with_database() -> RelayConfig {
        RelayConfig {
            database_url: Some("postgres://localhost/relay".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert!(config.database_url.is_none());
        assert!(!config.memory_store);
        assert_eq!(config.notify_channel, "data_changed");
        assert_eq!(config.stream, "messages");
        assert_eq!(config.overflow_policy, OverflowPolicy::DropOldest);
        assert!(with_database().validate().is_ok());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, json!({}));

        assert_eq!(RelayConfig::read(&path).unwrap(), RelayConfig::default());
    }

    #[test]
    fn test_database_url_required() {
        let err = RelayConfig::resolve(None, ConfigOverrides::default()).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
        assert!(err.message().contains("database_url is required"));

        let config = RelayConfig::resolve(
            None,
            ConfigOverrides {
                memory_store: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(config.memory_store);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_blank_database_url_rejected() {
        let config = RelayConfig {
            database_url: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().message().contains("must not be empty"));
    }

    #[test]
    fn test_file_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            json!({
                "database_url": "postgres://localhost/relay",
                "stream": "updates",
                "overflow_policy": "disconnect",
                "http": { "port": 3000 }
            }),
        );

        let config = RelayConfig::load(&path).unwrap();
        assert_eq!(config.stream, "updates");
        assert_eq!(config.overflow_policy, OverflowPolicy::Disconnect);
        assert_eq!(config.http.port, 3000);
        assert_eq!(config.http.host, "0.0.0.0");
    }

    #[test]
    fn test_overrides_win() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, json!({ "http": { "port": 3000 } }));

        let config = RelayConfig::resolve(
            Some(&path),
            ConfigOverrides {
                database_url: Some("postgres://localhost/relay".to_string()),
                port: Some(9000),
                dev_proxy_url: Some("http://localhost:5173".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(config.http.port, 9000);
        assert_eq!(
            config.http.dev_proxy_url.as_deref(),
            Some("http://localhost:5173")
        );
    }

    #[test]
    fn test_invalid_channel_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, json!({ "notify_channel": "Data Changed" }));

        let err = RelayConfig::load(&path).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }

    #[test]
    fn test_zero_buffers_rejected() {
        let config = RelayConfig {
            subscriber_buffer: 0,
            ..with_database()
        };
        assert!(config.validate().is_err());

        let config = RelayConfig {
            signal_buffer: 0,
            ..with_database()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_proxy_url_rejected() {
        let err = RelayConfig::resolve(
            None,
            ConfigOverrides {
                dev_proxy_url: Some("localhost:5173".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(err.message().contains("dev_proxy_url"));
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = RelayConfig::load(&temp_dir.path().join("missing.json")).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }
}
