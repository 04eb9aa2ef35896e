//! # Relay Loop
//!
//! The single consumer of the change signal source. Each signal starts one
//! refresh cycle:
//!
//! 1. read the `users` snapshot, then the `objects` snapshot
//! 2. encode both
//! 3. publish `users`, then `objects`
//!
//! Both payloads are prepared before the first publish, so a failed read or
//! encode aborts the whole cycle and subscribers never see half a pair.
//! Cycles run strictly one after another. A failed cycle is logged and the
//! loop waits for the next signal instead of retrying.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::errors::{RealtimeError, RealtimeResult};
use super::hub::{BroadcastHub, PublishReport};
use super::signal::ChangeSignals;
use crate::observability::RelayMetrics;
use crate::snapshot::{self, Collection};
use crate::store::Store;

/// Outcome of one completed refresh cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Rows in the published `users` snapshot
    pub users: usize,
    /// Rows in the published `objects` snapshot
    pub objects: usize,
    /// Delivery of the `users` event
    pub users_delivery: PublishReport,
    /// Delivery of the `objects` event
    pub objects_delivery: PublishReport,
}

/// The relay loop and its collaborators
pub struct Relay {
    store: Arc<dyn Store>,
    hub: BroadcastHub,
    stream: String,
    metrics: Arc<RelayMetrics>,
}

impl Relay {
    /// Create a relay publishing on `stream`, registering the stream with
    /// the hub if needed.
    pub fn new(
        store: Arc<dyn Store>,
        hub: BroadcastHub,
        stream: impl Into<String>,
        metrics: Arc<RelayMetrics>,
    ) -> RealtimeResult<Self> {
        let stream = stream.into();
        hub.create_stream(&stream)?;

        Ok(Self {
            store,
            hub,
            stream,
            metrics,
        })
    }

    /// Stream the snapshots are published on
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Run one refresh cycle.
    pub async fn refresh(&self) -> RealtimeResult<CycleReport> {
        let started = Instant::now();

        let users = self.store.read_users().await?;
        let objects = self.store.read_objects().await?;

        let users_json = snapshot::encode(&users)?;
        let objects_json = snapshot::encode(&objects)?;

        let users_delivery =
            self.hub
                .publish(&self.stream, Collection::Users.event_name(), users_json)?;
        let objects_delivery =
            self.hub
                .publish(&self.stream, Collection::Objects.event_name(), objects_json)?;

        debug!(
            users = users.len(),
            objects = objects.len(),
            subscribers = users_delivery.delivered,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "refresh cycle published"
        );

        Ok(CycleReport {
            users: users.len(),
            objects: objects.len(),
            users_delivery,
            objects_delivery,
        })
    }

    /// Consume change signals until the source closes.
    ///
    /// Only returns when no further refresh can ever happen; the caller must
    /// treat the returned error as fatal for the process.
    pub async fn run(self, mut signals: ChangeSignals) -> RealtimeError {
        info!(stream = %self.stream, "relay loop started");

        while let Some(absorbed) = signals.next().await {
            self.metrics.add_signals(absorbed as u64);
            if absorbed > 1 {
                debug!(absorbed, "coalesced change signals");
            }

            match self.refresh().await {
                Ok(_) => self.metrics.cycle_completed(Collection::ALL.len() as u64),
                Err(RealtimeError::HubClosed) => {
                    info!("broadcast hub closed, relay loop stopping");
                    return RealtimeError::HubClosed;
                }
                Err(e) => {
                    self.metrics.cycle_failed();
                    warn!(error = %e, code = e.code(), "refresh cycle aborted");
                }
            }
        }

        error!(stream = %self.stream, "change signal source closed");
        RealtimeError::SignalSourceClosed
    }
}
