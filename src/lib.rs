//! snapshot-relay - pushes full collection snapshots to SSE subscribers
//! whenever the backing store signals a change.
//!
//! Data flow: store mutation → change signal → relay loop → snapshot
//! readers → broadcast hub → every subscriber connection.

pub mod cli;
pub mod http_server;
pub mod observability;
pub mod realtime;
pub mod snapshot;
pub mod store;
