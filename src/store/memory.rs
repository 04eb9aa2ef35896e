//! In-process store.
//!
//! Behaves like the Postgres schema: every write raises a change signal to
//! all listeners, links are upserted by key. Reachability can be toggled to
//! exercise the connectivity failure paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use super::errors::{StoreError, StoreResult};
use super::link::{ObjectUserKey, ObjectUserLink};
use super::Store;
use crate::realtime::signal::{self, ChangeSignals, SignalSender};
use crate::snapshot::{ObjectRecord, RecordId, Snapshot, UserRecord};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<RecordId, UserRecord>,
    objects: BTreeMap<RecordId, ObjectRecord>,
    object_users: HashMap<ObjectUserKey, ObjectUserLink>,
}

/// In-memory store
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    listeners: Mutex<Vec<SignalSender>>,
    reachable: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty, reachable store
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            listeners: Mutex::new(Vec::new()),
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulate losing (or regaining) the store connection.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Insert or replace a user row.
    pub fn put_user(&self, user: UserRecord) -> StoreResult<()> {
        self.write_tables(|tables| {
            tables.users.insert(user.id, user);
        })?;
        self.raise_all();
        Ok(())
    }

    /// Insert or replace an object row.
    pub fn put_object(&self, object: ObjectRecord) -> StoreResult<()> {
        self.write_tables(|tables| {
            tables.objects.insert(object.id, object);
        })?;
        self.raise_all();
        Ok(())
    }

    /// Delete a user row. Returns whether it existed.
    pub fn delete_user(&self, id: RecordId) -> StoreResult<bool> {
        let removed = self.write_tables(|tables| tables.users.remove(&id).is_some())?;
        self.raise_all();
        Ok(removed)
    }

    /// Look up a single link.
    pub fn object_user(&self, key: ObjectUserKey) -> Option<ObjectUserLink> {
        self.tables
            .read()
            .ok()
            .and_then(|tables| tables.object_users.get(&key).cloned())
    }

    /// Number of stored links.
    pub fn object_user_count(&self) -> usize {
        self.tables
            .read()
            .map(|tables| tables.object_users.len())
            .unwrap_or(0)
    }

    /// Number of listeners still attached.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .map(|listeners| listeners.iter().filter(|l| !l.is_closed()).count())
            .unwrap_or(0)
    }

    /// Drop every listener, closing their signal sources.
    pub fn disconnect_listeners(&self) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.clear();
        }
    }

    fn ensure_reachable(&self) -> StoreResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Connectivity("memory store marked unreachable".into()))
        }
    }

    fn write_tables<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> StoreResult<R> {
        self.ensure_reachable()?;
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StoreError::Write("Lock poisoned".into()))?;
        Ok(f(&mut tables))
    }

    fn read_tables<R>(&self, f: impl FnOnce(&Tables) -> R) -> StoreResult<R> {
        self.ensure_reachable()?;
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::Read("Lock poisoned".into()))?;
        Ok(f(&tables))
    }

    /// Raise a signal on every listener, forgetting those that hung up.
    fn raise_all(&self) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|listener| listener.raise());
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn read_users(&self) -> StoreResult<Snapshot<UserRecord>> {
        self.read_tables(|tables| tables.users.clone())
    }

    async fn read_objects(&self) -> StoreResult<Snapshot<ObjectRecord>> {
        self.read_tables(|tables| tables.objects.clone())
    }

    async fn upsert_object_user(&self, key: ObjectUserKey) -> StoreResult<ObjectUserLink> {
        let now = Utc::now();
        let link = self.write_tables(|tables| {
            tables
                .object_users
                .entry(key)
                .and_modify(|link| link.updated_at = now.max(link.updated_at))
                .or_insert_with(|| ObjectUserLink::new(key, now))
                .clone()
        })?;
        self.raise_all();
        Ok(link)
    }

    async fn notify_changed(&self) -> StoreResult<()> {
        self.ensure_reachable()?;
        self.raise_all();
        Ok(())
    }

    async fn listen(&self, capacity: usize) -> StoreResult<ChangeSignals> {
        self.ensure_reachable()?;
        let (sender, signals) = signal::channel(capacity);
        self.listeners
            .lock()
            .map_err(|_| StoreError::Connectivity("Lock poisoned".into()))?
            .push(sender);
        Ok(signals)
    }
}
