//! HTTP Server Configuration
//!
//! Bind address, CORS, frontend locations and SSE keep-alive.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpServerConfig {
    /// Host to bind to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,

    /// CORS allowed origins (default: none, no CORS layer installed)
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Directory served under `/static` (default: "static")
    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    /// Prebuilt frontend served for every unmatched path (default: "frontend/dist")
    #[serde(default = "default_frontend_dir")]
    pub frontend_dir: String,

    /// Development server that unmatched paths are proxied to instead of
    /// `frontend_dir`
    #[serde(default)]
    pub dev_proxy_url: Option<String>,

    /// Seconds between SSE keep-alive comments (default: 15)
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_static_dir() -> String {
    "static".to_string()
}

fn default_frontend_dir() -> String {
    "frontend/dist".to_string()
}

fn default_keep_alive_secs() -> u64 {
    15
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            static_dir: default_static_dir(),
            frontend_dir: default_frontend_dir(),
            dev_proxy_url: None,
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl HttpServerConfig {
    /// Create a new config with specified port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Keep-alive interval for SSE responses
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }
}
