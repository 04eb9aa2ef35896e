//! # Store
//!
//! The relational store is an external collaborator. This module is the
//! seam the rest of the crate talks through:
//!
//! - **Snapshot readers**: `read_users` / `read_objects`, read-only and
//!   side-effect free, fully drained before returning
//! - **Mutation**: idempotent upsert of an object/user link
//! - **Change signals**: `notify_changed` raises one, `listen` opens the
//!   push-based signal source
//!
//! Any write to a watched table raises a change signal from inside the
//! store, so writers never need to know the relay exists.
//!
//! Two implementations are provided: [`PgStore`] (Postgres `LISTEN/NOTIFY`)
//! and [`MemoryStore`] (in-process, used for development and tests).

mod errors;
mod link;
mod memory;
mod postgres;
mod schema;

use async_trait::async_trait;

use crate::realtime::ChangeSignals;
use crate::snapshot::{ObjectRecord, Snapshot, UserRecord};

pub use errors::{StoreError, StoreResult};
pub use link::{ObjectUserKey, ObjectUserLink};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use schema::{migration_sql, validate_channel_name};

/// Handle to the backing store, shared by every task in the process.
///
/// Implementations must tolerate concurrent use without external locking.
#[async_trait]
pub trait Store: Send + Sync {
    /// Every row of the `users` collection.
    async fn read_users(&self) -> StoreResult<Snapshot<UserRecord>>;

    /// Every row of the `objects` collection.
    async fn read_objects(&self) -> StoreResult<Snapshot<ObjectRecord>>;

    /// Insert the link, or on key collision update only its timestamp.
    async fn upsert_object_user(&self, key: ObjectUserKey) -> StoreResult<ObjectUserLink>;

    /// Ask the store to emit a change signal to every listener.
    async fn notify_changed(&self) -> StoreResult<()>;

    /// Open a change signal source buffering at most `capacity` pending
    /// signals. Signals beyond that coalesce into the pending ones.
    async fn listen(&self, capacity: usize) -> StoreResult<ChangeSignals>;
}
