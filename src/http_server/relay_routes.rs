//! Relay HTTP Routes
//!
//! - `GET /events` - SSE subscription to a hub stream
//! - `POST /senddata` - ask the store to raise a change signal
//! - `POST /object_users` - upsert an object/user link
//!
//! None of these handlers publish to the hub directly; fresh snapshots only
//! ever come from the relay loop reacting to the store's change signals.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::realtime::{BroadcastHub, RealtimeError};
use crate::snapshot::RecordId;
use crate::store::{ObjectUserKey, ObjectUserLink, Store, StoreError};

// ==================
// Shared State
// ==================

/// Relay state shared across handlers
pub struct RelayState {
    pub store: Arc<dyn Store>,
    pub hub: BroadcastHub,
    /// Stream used when the subscriber does not name one
    pub default_stream: String,
    pub keep_alive: Duration,
}

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub stream: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ObjectUserRequest {
    pub object_id: RecordId,
    pub user_id: RecordId,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn store_failure(e: StoreError) -> ApiError {
    let status = if e.is_connectivity() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            code: e.code().to_string(),
        }),
    )
}

fn realtime_failure(e: RealtimeError) -> ApiError {
    let status = match e {
        RealtimeError::StreamNotFound(_) => StatusCode::NOT_FOUND,
        RealtimeError::HubClosed => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            code: e.code().to_string(),
        }),
    )
}

// ==================
// Relay Routes
// ==================

/// Create relay routes (mounted under `/api`)
pub fn relay_routes(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/events", get(events_handler))
        .route("/senddata", post(send_data_handler))
        .route("/object_users", post(upsert_object_user_handler))
        .with_state(state)
}

/// Open an SSE stream. The subscription is released when the response
/// stream is dropped, which happens on client disconnect, write failure or
/// hub shutdown.
async fn events_handler(
    State(state): State<Arc<RelayState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let stream = query
        .stream
        .unwrap_or_else(|| state.default_stream.clone());
    let subscription = state.hub.subscribe(&stream).map_err(realtime_failure)?;

    info!(subscriber = %subscription.id(), stream = %stream, "subscriber connected");

    let events = subscription
        .into_stream()
        .map(|message| {
            Ok::<_, Infallible>(Event::default().event(&message.event).data(&message.data))
        });

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(state.keep_alive)))
}

/// Ask the store to emit a change signal. Answers as soon as the store has
/// accepted the request; the refresh happens asynchronously.
async fn send_data_handler(
    State(state): State<Arc<RelayState>>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    state.store.notify_changed().await.map_err(store_failure)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "Change signal sent".to_string(),
        }),
    ))
}

/// Upsert an object/user link. Repeating the request only refreshes the
/// link's timestamp.
async fn upsert_object_user_handler(
    State(state): State<Arc<RelayState>>,
    Json(request): Json<ObjectUserRequest>,
) -> Result<Json<ObjectUserLink>, ApiError> {
    info!(
        object_id = request.object_id,
        user_id = request.user_id,
        "upserting object user link"
    );

    let link = state
        .store
        .upsert_object_user(ObjectUserKey::new(request.object_id, request.user_id))
        .await
        .map_err(store_failure)?;

    Ok(Json(link))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_user_request_parse() {
        let request: ObjectUserRequest =
            serde_json::from_str(r#"{"object_id":1,"user_id":2}"#).unwrap();
        assert_eq!(request.object_id, 1);
        assert_eq!(request.user_id, 2);
    }

    #[test]
    fn test_store_failure_status() {
        let (status, body) = store_failure(StoreError::Connectivity("down".into()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.code, "STORE_UNREACHABLE");

        let (status, _) = store_failure(StoreError::Write("constraint".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_realtime_failure_status() {
        let (status, body) = realtime_failure(RealtimeError::StreamNotFound("x".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.code, "STREAM_NOT_FOUND");

        let (status, _) = realtime_failure(RealtimeError::HubClosed);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
