//! Observability subsystem
//!
//! - Structured logging through `tracing` (compact text or JSON lines)
//! - Relay counters, exposed over HTTP
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on the relay path
//! 3. Counters are lock-free
//!
//! # Usage
//!
//! ```ignore
//! use snapshot_relay::observability::{init_logging, LogFormat, RelayMetrics};
//!
//! init_logging("info", LogFormat::Compact)?;
//!
//! let metrics = RelayMetrics::new();
//! metrics.cycle_completed(2);
//! ```

mod logger;
mod metrics;

pub use logger::{build_env_filter, init_logging, LogFormat};
pub use metrics::{RelayMetrics, RelayMetricsSnapshot};
