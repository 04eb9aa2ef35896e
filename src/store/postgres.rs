//! Postgres-backed store.
//!
//! Queries go through one pipelined `tokio_postgres::Client`, which accepts
//! concurrent requests from any number of tasks. When that session is lost
//! the next query opens a fresh one, so a dropped connection costs at most
//! the requests that were in flight. Change signals arrive on a second,
//! dedicated connection that only ever runs `LISTEN`.

use std::pin::pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use tokio::sync::{Mutex, RwLock};
use tokio_postgres::{AsyncMessage, Client, NoTls};
use tracing::{debug, error, info, warn};

use super::errors::{StoreError, StoreResult};
use super::link::{ObjectUserKey, ObjectUserLink};
use super::schema::{migration_sql, validate_channel_name};
use super::Store;
use crate::realtime::signal::{self, ChangeSignals};
use crate::snapshot::{collect_snapshot, ObjectRecord, Snapshot, UserRecord};

const SELECT_USERS: &str = "SELECT id::bigint, email FROM users";
const SELECT_OBJECTS: &str = "SELECT id::bigint, name, image FROM objects";
const UPSERT_OBJECT_USER: &str = "INSERT INTO object_users (object_id, user_id) \
     VALUES ($1, $2) \
     ON CONFLICT (object_id, user_id) DO UPDATE SET updated_at = now() \
     RETURNING object_id::bigint, user_id::bigint, updated_at";
const NOTIFY: &str = "SELECT pg_notify($1, '')";

/// Postgres store
pub struct PgStore {
    url: String,
    channel: String,
    /// Query session, replaced once closed.
    client: RwLock<Arc<Client>>,
    /// Session holding the `LISTEN`; dropping it ends the signal source.
    listener: Mutex<Option<Client>>,
}

/// Open one query session and drive its connection in the background.
async fn open_session(url: &str) -> StoreResult<Client> {
    let (client, connection) = tokio_postgres::connect(url, NoTls)
        .await
        .map_err(|e| StoreError::Connectivity(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!(error = %e, "store connection terminated");
        }
    });

    Ok(client)
}

impl PgStore {
    /// Connect to `url`, using `channel` for change notifications.
    ///
    /// Fails with `Connectivity` when the database cannot be reached.
    pub async fn connect(url: &str, channel: &str) -> StoreResult<Self> {
        validate_channel_name(channel)?;

        let client = open_session(url).await?;
        info!(channel, "connected to postgres");

        Ok(Self {
            url: url.to_string(),
            channel: channel.to_string(),
            client: RwLock::new(Arc::new(client)),
            listener: Mutex::new(None),
        })
    }

    /// The current query session, reconnecting first if it was closed.
    async fn client(&self) -> StoreResult<Arc<Client>> {
        {
            let client = self.client.read().await;
            if !client.is_closed() {
                return Ok(Arc::clone(&client));
            }
        }

        let mut client = self.client.write().await;
        // Another task may have reconnected while we waited.
        if client.is_closed() {
            warn!("store connection lost, reconnecting");
            *client = Arc::new(open_session(&self.url).await?);
            info!("reconnected to postgres");
        }
        Ok(Arc::clone(&client))
    }

    /// Backend process id of the current query session.
    pub async fn session_pid(&self) -> StoreResult<i32> {
        let row = self
            .client()
            .await?
            .query_one("SELECT pg_backend_pid()", &[])
            .await?;
        Ok(row.try_get::<_, i32>(0)?)
    }

    /// Create the watched tables and their notify triggers.
    pub async fn migrate(&self) -> StoreResult<()> {
        let sql = migration_sql(&self.channel)?;
        self.client()
            .await?
            .batch_execute(&sql)
            .await
            .map_err(write_error)?;
        info!(channel = %self.channel, "schema migrated");
        Ok(())
    }
}

fn write_error(e: tokio_postgres::Error) -> StoreError {
    if e.is_closed() {
        StoreError::Connectivity(e.to_string())
    } else {
        StoreError::Write(e.to_string())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn read_users(&self) -> StoreResult<Snapshot<UserRecord>> {
        let rows = self.client().await?.query(SELECT_USERS, &[]).await?;
        let users = rows
            .iter()
            .map(|row| -> StoreResult<UserRecord> {
                Ok(UserRecord {
                    id: row.try_get(0)?,
                    email: row.try_get(1)?,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(collect_snapshot(users))
    }

    async fn read_objects(&self) -> StoreResult<Snapshot<ObjectRecord>> {
        let rows = self.client().await?.query(SELECT_OBJECTS, &[]).await?;
        let objects = rows
            .iter()
            .map(|row| -> StoreResult<ObjectRecord> {
                Ok(ObjectRecord {
                    id: row.try_get(0)?,
                    name: row.try_get(1)?,
                    image: row.try_get(2)?,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(collect_snapshot(objects))
    }

    async fn upsert_object_user(&self, key: ObjectUserKey) -> StoreResult<ObjectUserLink> {
        let row = self
            .client()
            .await?
            .query_one(UPSERT_OBJECT_USER, &[&key.object_id, &key.user_id])
            .await
            .map_err(write_error)?;

        Ok(ObjectUserLink {
            object_id: row.try_get(0).map_err(write_error)?,
            user_id: row.try_get(1).map_err(write_error)?,
            updated_at: row.try_get(2).map_err(write_error)?,
        })
    }

    async fn notify_changed(&self) -> StoreResult<()> {
        self.client()
            .await?
            .execute(NOTIFY, &[&self.channel])
            .await
            .map_err(write_error)?;
        Ok(())
    }

    async fn listen(&self, capacity: usize) -> StoreResult<ChangeSignals> {
        let (client, mut connection) = tokio_postgres::connect(&self.url, NoTls)
            .await
            .map_err(|e| StoreError::Connectivity(e.to_string()))?;

        let (sender, signals) = signal::channel(capacity);
        let channel = self.channel.clone();

        tokio::spawn(async move {
            let mut messages = pin!(stream::poll_fn(move |cx| connection.poll_message(cx)));

            while let Some(message) = messages.next().await {
                match message {
                    Ok(AsyncMessage::Notification(note)) if note.channel() == channel => {
                        if !sender.raise() {
                            debug!(channel = %channel, "signal source dropped, stopping listener");
                            break;
                        }
                    }
                    Ok(AsyncMessage::Notice(notice)) => {
                        debug!(notice = %notice, "postgres notice");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, channel = %channel, "listener connection failed");
                        break;
                    }
                }
            }

            warn!(channel = %channel, "listener connection closed");
        });

        client
            .batch_execute(&format!("LISTEN {}", self.channel))
            .await
            .map_err(|e| StoreError::Connectivity(e.to_string()))?;

        info!(channel = %self.channel, "listening for change notifications");

        *self.listener.lock().await = Some(client);
        Ok(signals)
    }
}
