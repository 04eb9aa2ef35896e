//! # Real-Time Errors
//!
//! Error types for the hub and relay loop.

use thiserror::Error;

use crate::store::StoreError;

/// Result type for real-time operations
pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Real-time errors
#[derive(Debug, Clone, Error)]
pub enum RealtimeError {
    // ==================
    // Hub Errors
    // ==================
    /// No stream with this name was created
    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    /// The hub has been shut down
    #[error("Broadcast hub is closed")]
    HubClosed,

    // ==================
    // Relay Errors
    // ==================
    /// Snapshot read failed; the cycle was aborted
    #[error("Snapshot read failed: {0}")]
    Store(#[from] StoreError),

    /// Snapshot could not be encoded; the cycle was aborted
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Every change signal sender is gone; no further refresh can happen
    #[error("Change signal source closed")]
    SignalSourceClosed,

    // ==================
    // Internal Errors
    // ==================
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RealtimeError {
    /// Stable error code reported to HTTP clients
    pub fn code(&self) -> &'static str {
        match self {
            RealtimeError::StreamNotFound(_) => "STREAM_NOT_FOUND",
            RealtimeError::HubClosed => "HUB_CLOSED",
            RealtimeError::Store(e) => e.code(),
            RealtimeError::Serialization(_) => "SERIALIZATION_FAILED",
            RealtimeError::SignalSourceClosed => "SIGNAL_SOURCE_CLOSED",
            RealtimeError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(e: serde_json::Error) -> Self {
        RealtimeError::Serialization(e.to_string())
    }
}
