//! # Real-Time Module
//!
//! Change-notification relay: store change signals in, collection snapshots
//! out to every SSE subscriber.
//!
//! ## Architecture
//!
//! - **Signal**: bounded, coalescing source of payload-less change signals
//! - **Hub**: named streams with per-subscriber bounded mailboxes
//! - **Relay**: the single loop turning signals into published snapshots
//!
//! Delivery is best-effort and at-most-once. A subscriber that connects
//! late, or loses messages to overflow, simply waits for the next snapshot,
//! which supersedes everything before it.

pub mod errors;
pub mod hub;
pub mod relay;
pub mod signal;

pub use errors::{RealtimeError, RealtimeResult};
pub use hub::{
    BroadcastHub, HubConfig, HubStats, Message, OverflowPolicy, PublishReport, SubscriberId,
    Subscription, DEFAULT_SUBSCRIBER_BUFFER,
};
pub use relay::{CycleReport, Relay};
pub use signal::{ChangeSignal, ChangeSignals, SignalSender};
