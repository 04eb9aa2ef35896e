//! # Broadcast Hub
//!
//! Fans published messages out to every subscriber of a named stream.
//!
//! Each subscriber owns a bounded mailbox. Publishing never waits on a
//! subscriber: when a mailbox is full the configured [`OverflowPolicy`]
//! decides what gives way. Subscriptions start from "now"; nothing is
//! replayed.
//!
//! ## Locking
//!
//! The subscriber set sits behind one `RwLock`. Publish takes the read side
//! and only touches each mailbox's own short-lived mutex, so concurrent
//! publishers never serialize on a slow consumer. Subscribe, unsubscribe and
//! the removal of overflowing subscribers take the write side briefly.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use super::errors::{RealtimeError, RealtimeResult};

/// Default number of undelivered messages a subscriber may hold
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Identity of one subscription
pub type SubscriberId = Uuid;

/// What happens when a subscriber's mailbox is full at publish time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued message. Snapshots supersede each other, so
    /// the subscriber still converges on the latest state.
    #[default]
    DropOldest,
    /// Keep the queue as is and discard the new message for that subscriber
    DropNewest,
    /// Close the subscription and remove it from the hub
    Disconnect,
}

impl std::fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverflowPolicy::DropOldest => write!(f, "drop_oldest"),
            OverflowPolicy::DropNewest => write!(f, "drop_newest"),
            OverflowPolicy::Disconnect => write!(f, "disconnect"),
        }
    }
}

/// Hub configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Mailbox capacity per subscriber (at least 1)
    pub subscriber_buffer: usize,
    /// Overflow policy applied to every subscriber
    pub overflow_policy: OverflowPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

/// A published message, shared by every mailbox it was delivered to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Event name (`users`, `objects`)
    pub event: String,
    /// Encoded payload
    pub data: String,
}

/// Outcome of a single publish
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Subscribers that have the message queued
    pub delivered: usize,
    /// Messages lost to overflow (evicted or discarded)
    pub dropped: usize,
    /// Subscribers removed by the `disconnect` policy
    pub disconnected: usize,
}

/// Point-in-time hub statistics
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub streams: usize,
    pub subscribers: usize,
    pub messages_published: u64,
    pub messages_dropped: u64,
    pub subscribers_disconnected: u64,
}

enum Offer {
    Queued,
    Evicted,
    Discarded,
    Overflowed,
}

#[derive(Debug)]
struct Mailbox {
    queue: Mutex<VecDeque<Arc<Message>>>,
    capacity: usize,
    ready: Notify,
    closed: AtomicBool,
}

impl Mailbox {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            ready: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn offer(&self, message: &Arc<Message>, policy: OverflowPolicy) -> Offer {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);

        let offer = if queue.len() < self.capacity {
            queue.push_back(Arc::clone(message));
            Offer::Queued
        } else {
            match policy {
                OverflowPolicy::DropOldest => {
                    queue.pop_front();
                    queue.push_back(Arc::clone(message));
                    Offer::Evicted
                }
                OverflowPolicy::DropNewest => return Offer::Discarded,
                OverflowPolicy::Disconnect => return Offer::Overflowed,
            }
        };
        drop(queue);

        self.ready.notify_one();
        offer
    }

    fn pop(&self) -> Option<Arc<Message>> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Stop accepting messages. Already queued ones are still handed out
    /// unless `discard_pending` is set.
    fn close(&self, discard_pending: bool) {
        if discard_pending {
            self.queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
        self.closed.store(true, Ordering::Release);
        self.ready.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

type Subscribers = HashMap<SubscriberId, Arc<Mailbox>>;

#[derive(Debug)]
struct HubInner {
    config: HubConfig,
    streams: RwLock<HashMap<String, Subscribers>>,
    closed: AtomicBool,
    published: AtomicU64,
    dropped: AtomicU64,
    disconnected: AtomicU64,
}

impl HubInner {
    fn remove(&self, stream: &str, id: SubscriberId) -> Option<Arc<Mailbox>> {
        let mut streams = self.streams.write().ok()?;
        streams.get_mut(stream)?.remove(&id)
    }
}

/// The broadcast hub. Cheap to clone; clones share the same streams.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl BroadcastHub {
    /// Create a hub with no streams
    pub fn new(config: HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                streams: RwLock::new(HashMap::new()),
                closed: AtomicBool::new(false),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                disconnected: AtomicU64::new(0),
            }),
        }
    }

    /// Hub configuration
    pub fn config(&self) -> HubConfig {
        self.inner.config
    }

    /// Register a named stream. Creating an existing stream is a no-op.
    pub fn create_stream(&self, name: &str) -> RealtimeResult<()> {
        let mut streams = self
            .inner
            .streams
            .write()
            .map_err(|_| RealtimeError::Internal("Lock poisoned".into()))?;

        if !streams.contains_key(name) {
            streams.insert(name.to_string(), HashMap::new());
            debug!(stream = name, "stream created");
        }
        Ok(())
    }

    /// Whether a stream with this name exists
    pub fn has_stream(&self, name: &str) -> bool {
        self.inner
            .streams
            .read()
            .map(|streams| streams.contains_key(name))
            .unwrap_or(false)
    }

    /// Subscribe to `stream`. Only messages published after this call are
    /// delivered.
    pub fn subscribe(&self, stream: &str) -> RealtimeResult<Subscription> {
        let mut streams = self
            .inner
            .streams
            .write()
            .map_err(|_| RealtimeError::Internal("Lock poisoned".into()))?;

        // Checked under the lock so `close` cannot miss this subscriber.
        if self.is_closed() {
            return Err(RealtimeError::HubClosed);
        }

        let subscribers = streams
            .get_mut(stream)
            .ok_or_else(|| RealtimeError::StreamNotFound(stream.to_string()))?;

        let id = Uuid::new_v4();
        let mailbox = Arc::new(Mailbox::new(self.inner.config.subscriber_buffer));
        subscribers.insert(id, Arc::clone(&mailbox));

        Ok(Subscription {
            id,
            stream: stream.to_string(),
            mailbox,
            hub: Arc::downgrade(&self.inner),
        })
    }

    /// Remove a subscriber. Returns whether it was still registered;
    /// repeated calls are harmless.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = match self.inner.streams.write() {
            Ok(mut streams) => streams
                .values_mut()
                .find_map(|subscribers| subscribers.remove(&id)),
            Err(_) => None,
        };

        match removed {
            Some(mailbox) => {
                mailbox.close(true);
                true
            }
            None => false,
        }
    }

    /// Deliver a message to every current subscriber of `stream`.
    ///
    /// Never blocks on a subscriber. Fails only if the stream is unknown or
    /// the hub is closed.
    pub fn publish(
        &self,
        stream: &str,
        event: &str,
        data: impl Into<String>,
    ) -> RealtimeResult<PublishReport> {
        if self.is_closed() {
            return Err(RealtimeError::HubClosed);
        }

        let message = Arc::new(Message {
            event: event.to_string(),
            data: data.into(),
        });
        let policy = self.inner.config.overflow_policy;
        let mut report = PublishReport::default();
        let mut overflowed = Vec::new();

        {
            let streams = self
                .inner
                .streams
                .read()
                .map_err(|_| RealtimeError::Internal("Lock poisoned".into()))?;
            let subscribers = streams
                .get(stream)
                .ok_or_else(|| RealtimeError::StreamNotFound(stream.to_string()))?;

            for (id, mailbox) in subscribers {
                match mailbox.offer(&message, policy) {
                    Offer::Queued => report.delivered += 1,
                    Offer::Evicted => {
                        report.delivered += 1;
                        report.dropped += 1;
                    }
                    Offer::Discarded => report.dropped += 1,
                    Offer::Overflowed => overflowed.push(*id),
                }
            }
        }

        for id in overflowed {
            if let Some(mailbox) = self.inner.remove(stream, id) {
                mailbox.close(true);
                report.disconnected += 1;
                report.dropped += 1;
                warn!(subscriber = %id, stream, "disconnected slow subscriber");
            }
        }

        self.inner.published.fetch_add(1, Ordering::Relaxed);
        self.inner
            .dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);
        self.inner
            .disconnected
            .fetch_add(report.disconnected as u64, Ordering::Relaxed);

        if report.dropped > 0 && policy != OverflowPolicy::Disconnect {
            debug!(stream, event, dropped = report.dropped, "subscriber buffers overflowed");
        }

        Ok(report)
    }

    /// Shut the hub down. Subscribers receive what is already queued and
    /// then their streams end; new subscriptions are refused.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Ok(mut streams) = self.inner.streams.write() {
            for subscribers in streams.values_mut() {
                for (_, mailbox) in subscribers.drain() {
                    mailbox.close(false);
                }
            }
        }
        debug!("broadcast hub closed");
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of subscribers on `stream`
    pub fn subscriber_count(&self, stream: &str) -> usize {
        self.inner
            .streams
            .read()
            .ok()
            .and_then(|streams| streams.get(stream).map(HashMap::len))
            .unwrap_or(0)
    }

    /// Current statistics
    pub fn stats(&self) -> HubStats {
        let (streams, subscribers) = self
            .inner
            .streams
            .read()
            .map(|streams| (streams.len(), streams.values().map(HashMap::len).sum::<usize>()))
            .unwrap_or((0, 0));

        HubStats {
            streams,
            subscribers,
            messages_published: self.inner.published.load(Ordering::Relaxed),
            messages_dropped: self.inner.dropped.load(Ordering::Relaxed),
            subscribers_disconnected: self.inner.disconnected.load(Ordering::Relaxed),
        }
    }
}

/// A live subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    stream: String,
    mailbox: Arc<Mailbox>,
    hub: Weak<HubInner>,
}

impl Subscription {
    /// Subscriber identity
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Stream this subscription is attached to
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Messages queued but not yet received
    pub fn pending(&self) -> usize {
        self.mailbox.pending()
    }

    /// Wait for the next message. `None` once the subscription has been
    /// closed and its queue drained.
    pub async fn recv(&mut self) -> Option<Arc<Message>> {
        loop {
            if let Some(message) = self.mailbox.pop() {
                return Some(message);
            }
            if self.mailbox.is_closed() {
                return None;
            }
            self.mailbox.ready.notified().await;
        }
    }

    /// Take the next queued message without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<Message>> {
        self.mailbox.pop()
    }

    /// Turn the subscription into an endless stream of messages that ends
    /// only when the subscription is closed.
    pub fn into_stream(self) -> impl Stream<Item = Arc<Message>> + Send + 'static {
        stream::unfold(self, |mut subscription| async move {
            let message = subscription.recv().await?;
            Some((message, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            if hub.remove(&self.stream, self.id).is_some() {
                debug!(subscriber = %self.id, stream = %self.stream, "subscription released");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn hub_with(buffer: usize, policy: OverflowPolicy) -> BroadcastHub {
        let hub = BroadcastHub::new(HubConfig {
            subscriber_buffer: buffer,
            overflow_policy: policy,
        });
        hub.create_stream("messages").unwrap();
        hub
    }

    fn drain(subscription: &mut Subscription) -> Vec<String> {
        std::iter::from_fn(|| subscription.try_recv())
            .map(|m| m.data.clone())
            .collect()
    }

    #[test]
    fn test_subscribe_unknown_stream() {
        let hub = BroadcastHub::default();
        assert!(matches!(
            hub.subscribe("nope"),
            Err(RealtimeError::StreamNotFound(_))
        ));
    }

    #[test]
    fn test_create_stream_is_idempotent() {
        let hub = hub_with(4, OverflowPolicy::DropOldest);
        let _sub = hub.subscribe("messages").unwrap();

        hub.create_stream("messages").unwrap();
        assert!(hub.has_stream("messages"));
        assert_eq!(hub.subscriber_count("messages"), 1);
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber_in_order() {
        let hub = hub_with(8, OverflowPolicy::DropOldest);
        let mut first = hub.subscribe("messages").unwrap();
        let mut second = hub.subscribe("messages").unwrap();

        let report = hub.publish("messages", "users", "{}").unwrap();
        assert_eq!(report.delivered, 2);
        hub.publish("messages", "objects", "[]").unwrap();

        for sub in [&mut first, &mut second] {
            assert_eq!(sub.recv().await.unwrap().event, "users");
            assert_eq!(sub.recv().await.unwrap().event, "objects");
        }
    }

    #[test]
    fn test_publish_unknown_stream() {
        let hub = BroadcastHub::default();
        assert!(matches!(
            hub.publish("nope", "users", "{}"),
            Err(RealtimeError::StreamNotFound(_))
        ));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = hub_with(4, OverflowPolicy::DropOldest);
        let report = hub.publish("messages", "users", "{}").unwrap();
        assert_eq!(report, PublishReport::default());
        assert_eq!(hub.stats().messages_published, 1);
    }

    #[test]
    fn test_no_replay_for_new_subscriber() {
        let hub = hub_with(4, OverflowPolicy::DropOldest);
        hub.publish("messages", "users", "before").unwrap();

        let mut late = hub.subscribe("messages").unwrap();
        assert!(late.try_recv().is_none());

        hub.publish("messages", "users", "after").unwrap();
        assert_eq!(drain(&mut late), vec!["after"]);
    }

    #[test]
    fn test_drop_oldest_policy() {
        let hub = hub_with(2, OverflowPolicy::DropOldest);
        let mut sub = hub.subscribe("messages").unwrap();

        hub.publish("messages", "e", "1").unwrap();
        hub.publish("messages", "e", "2").unwrap();
        let report = hub.publish("messages", "e", "3").unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(drain(&mut sub), vec!["2", "3"]);
    }

    #[test]
    fn test_drop_newest_policy() {
        let hub = hub_with(2, OverflowPolicy::DropNewest);
        let mut sub = hub.subscribe("messages").unwrap();

        hub.publish("messages", "e", "1").unwrap();
        hub.publish("messages", "e", "2").unwrap();
        let report = hub.publish("messages", "e", "3").unwrap();

        assert_eq!(report.delivered, 0);
        assert_eq!(report.dropped, 1);
        assert_eq!(drain(&mut sub), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_disconnect_policy_removes_only_the_slow_subscriber() {
        let hub = hub_with(1, OverflowPolicy::Disconnect);
        let mut slow = hub.subscribe("messages").unwrap();
        let mut fast = hub.subscribe("messages").unwrap();

        hub.publish("messages", "e", "1").unwrap();
        assert_eq!(fast.recv().await.unwrap().data, "1");

        let report = hub.publish("messages", "e", "2").unwrap();
        assert_eq!(report.disconnected, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(hub.subscriber_count("messages"), 1);

        assert!(slow.recv().await.is_none());
        assert_eq!(fast.recv().await.unwrap().data, "2");
        assert_eq!(hub.stats().subscribers_disconnected, 1);
    }

    #[test]
    fn test_slow_subscriber_never_blocks_publish() {
        let hub = hub_with(4, OverflowPolicy::DropOldest);
        let _stalled = hub.subscribe("messages").unwrap();
        let mut reader = hub.subscribe("messages").unwrap();

        for i in 0..1_000 {
            hub.publish("messages", "e", i.to_string()).unwrap();
            assert_eq!(reader.try_recv().unwrap().data, i.to_string());
        }
        assert_eq!(hub.stats().messages_dropped, 996);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent_and_ends_stream() {
        let hub = hub_with(4, OverflowPolicy::DropOldest);
        let mut sub = hub.subscribe("messages").unwrap();
        hub.publish("messages", "e", "queued").unwrap();

        assert!(hub.unsubscribe(sub.id()));
        assert!(!hub.unsubscribe(sub.id()));
        assert_eq!(hub.subscriber_count("messages"), 0);
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_drop_releases_subscriber() {
        let hub = hub_with(4, OverflowPolicy::DropOldest);
        let sub = hub.subscribe("messages").unwrap();
        assert_eq!(hub.subscriber_count("messages"), 1);

        drop(sub);
        assert_eq!(hub.subscriber_count("messages"), 0);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let hub = hub_with(4, OverflowPolicy::DropOldest);
        let sub = hub.subscribe("messages").unwrap();
        hub.publish("messages", "e", "last").unwrap();

        hub.close();

        let received: Vec<_> = sub.into_stream().map(|m| m.data.clone()).collect().await;
        assert_eq!(received, vec!["last"]);
        assert!(matches!(hub.subscribe("messages"), Err(RealtimeError::HubClosed)));
        assert!(matches!(
            hub.publish("messages", "e", "x"),
            Err(RealtimeError::HubClosed)
        ));
    }

    #[tokio::test]
    async fn test_recv_wakes_on_publish() {
        let hub = hub_with(4, OverflowPolicy::DropOldest);
        let mut sub = hub.subscribe("messages").unwrap();

        let publisher = hub.clone();
        let handle = tokio::spawn(async move {
            tokio::task::yield_now().await;
            publisher.publish("messages", "users", "{}").unwrap();
        });

        let message = sub.recv().await.unwrap();
        assert_eq!(message.event, "users");
        handle.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_subscribe_publish_unsubscribe() {
        let hub = hub_with(16, OverflowPolicy::DropOldest);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let hub = hub.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let sub = hub.subscribe("messages").unwrap();
                    hub.publish("messages", "e", "x").unwrap();
                    hub.unsubscribe(sub.id());
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(hub.subscriber_count("messages"), 0);
        assert_eq!(hub.stats().messages_published, 400);
    }

    #[test]
    fn test_policy_serde_names() {
        let policy: OverflowPolicy = serde_json::from_str("\"disconnect\"").unwrap();
        assert_eq!(policy, OverflowPolicy::Disconnect);
        assert_eq!(OverflowPolicy::default().to_string(), "drop_oldest");
    }
}
