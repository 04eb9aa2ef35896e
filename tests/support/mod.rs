//! Shared harness for the integration tests.
//!
//! Wires an in-memory store, a hub and a running relay loop the same way
//! `serve` does, without binding a socket.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::Router;
use futures_util::StreamExt;
use tokio::task::JoinHandle;

use snapshot_relay::http_server::{AppContext, HttpServer, HttpServerConfig};
use snapshot_relay::observability::{RelayMetrics, RelayMetricsSnapshot};
use snapshot_relay::realtime::{
    BroadcastHub, ChangeSignals, HubConfig, Message, RealtimeError, Relay, Subscription,
};
use snapshot_relay::snapshot::{ObjectRecord, Snapshot, UserRecord};
use snapshot_relay::store::{
    MemoryStore, ObjectUserKey, ObjectUserLink, Store, StoreError, StoreResult,
};

pub const STREAM: &str = "messages";

// =============================================================================
// Stores
// =============================================================================

/// Memory store whose snapshot reads can be made to fail on demand while
/// signals and writes keep working.
pub struct FailingReads {
    pub inner: MemoryStore,
    failure: Mutex<Option<StoreError>>,
}

impl FailingReads {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            failure: Mutex::new(None),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail_with(fail.then(|| StoreError::Read("scan failed".into())));
    }

    /// Fail every `users` read with `error` until cleared with `None`.
    pub fn fail_with(&self, error: Option<StoreError>) {
        *self.failure.lock().unwrap() = error;
    }
}

#[async_trait]
impl Store for FailingReads {
    async fn read_users(&self) -> StoreResult<Snapshot<UserRecord>> {
        let failure = self.failure.lock().unwrap().clone();
        if let Some(e) = failure {
            return Err(e);
        }
        self.inner.read_users().await
    }

    async fn read_objects(&self) -> StoreResult<Snapshot<ObjectRecord>> {
        self.inner.read_objects().await
    }

    async fn upsert_object_user(&self, key: ObjectUserKey) -> StoreResult<ObjectUserLink> {
        self.inner.upsert_object_user(key).await
    }

    async fn notify_changed(&self) -> StoreResult<()> {
        self.inner.notify_changed().await
    }

    async fn listen(&self, capacity: usize) -> StoreResult<ChangeSignals> {
        self.inner.listen(capacity).await
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness<S: Store + 'static> {
    pub store: Arc<S>,
    pub hub: BroadcastHub,
    pub metrics: Arc<RelayMetrics>,
    relay: JoinHandle<RealtimeError>,
}

impl Harness<MemoryStore> {
    pub async fn start() -> Self {
        Self::over(Arc::new(MemoryStore::new()), HubConfig::default()).await
    }
}

impl<S: Store + 'static> Harness<S> {
    /// Start a relay loop over `store`.
    pub async fn over(store: Arc<S>, hub_config: HubConfig) -> Self {
        let signals = store.listen(16).await.unwrap();
        let hub = BroadcastHub::new(hub_config);
        let metrics = Arc::new(RelayMetrics::new());

        let dyn_store: Arc<dyn Store> = store.clone();
        let relay = Relay::new(dyn_store, hub.clone(), STREAM, Arc::clone(&metrics)).unwrap();
        let relay = tokio::spawn(relay.run(signals));

        Self {
            store,
            hub,
            metrics,
            relay,
        }
    }

    /// Router over the same store and hub.
    pub fn router(&self, config: HttpServerConfig) -> Router {
        let store: Arc<dyn Store> = self.store.clone();
        HttpServer::new(
            config,
            AppContext {
                store,
                hub: self.hub.clone(),
                metrics: Arc::clone(&self.metrics),
                stream: STREAM.to_string(),
            },
        )
        .router()
    }

    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe(STREAM).unwrap()
    }

    /// Poll the relay counters until `check` holds.
    pub async fn wait_until(&self, check: impl Fn(RelayMetricsSnapshot) -> bool) {
        for _ in 0..400 {
            if check(self.metrics.snapshot()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "relay never reached the expected state: {:?}",
            self.metrics.snapshot()
        );
    }

    pub fn relay_finished(&self) -> bool {
        self.relay.is_finished()
    }
}

// =============================================================================
// Receiving
// =============================================================================

/// Next message for `subscription`, failing the test after two seconds.
pub async fn next_message(subscription: &mut Subscription) -> Arc<Message> {
    tokio::time::timeout(Duration::from_secs(2), subscription.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("subscription closed")
}

/// Read `count` SSE events (`event:` name and `data:` payload) off a
/// response body.
pub async fn read_sse_events(body: Body, count: usize) -> Vec<(String, String)> {
    let mut frames = body.into_data_stream();
    let mut buffer = String::new();
    let mut events = Vec::new();

    while events.len() < count {
        let chunk = tokio::time::timeout(Duration::from_secs(2), frames.next())
            .await
            .expect("timed out waiting for an SSE frame")
            .expect("SSE body ended early")
            .expect("SSE body failed");
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(end) = buffer.find("\n\n") {
            let frame: String = buffer.drain(..end + 2).collect();
            let mut name = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    name = Some(value.trim_start().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data = Some(value.trim_start().to_string());
                }
            }
            // Keep-alive comments carry neither field.
            if let (Some(name), Some(data)) = (name, data) {
                events.push((name, data));
            }
        }
    }

    events
}
