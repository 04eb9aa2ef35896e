//! Relay counters
//!
//! - Counters only, monotonic, reset on process start
//! - Lock-free; Relaxed ordering is enough for reporting

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters maintained by the relay loop
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Change signals consumed (including coalesced ones)
    signals_received: AtomicU64,
    /// Refresh cycles that published both snapshots
    cycles_completed: AtomicU64,
    /// Refresh cycles aborted before publishing
    cycles_failed: AtomicU64,
    /// Events handed to the hub
    events_published: AtomicU64,
}

/// Serializable copy of [`RelayMetrics`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayMetricsSnapshot {
    pub signals_received: u64,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub events_published: u64,
}

impl RelayMetrics {
    /// Create a registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `count` consumed signals
    pub fn add_signals(&self, count: u64) {
        self.signals_received.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a cycle that published `events` events
    pub fn cycle_completed(&self, events: u64) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.events_published.fetch_add(events, Ordering::Relaxed);
    }

    /// Record an aborted cycle
    pub fn cycle_failed(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter
    pub fn snapshot(&self) -> RelayMetricsSnapshot {
        RelayMetricsSnapshot {
            signals_received: self.signals_received.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
        }
    }
}
