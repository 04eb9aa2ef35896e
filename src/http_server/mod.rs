//! # HTTP Server Module
//!
//! Combines the relay, observability and frontend routers into one Axum
//! server.
//!
//! # Endpoints
//!
//! - `/health` - Health check
//! - `/api/events` - Server-sent events for a hub stream
//! - `/api/senddata` - Raise a change signal
//! - `/api/object_users` - Upsert an object/user link
//! - `/observability/*` - Metrics and monitoring
//! - `/static/*` - Static assets
//! - everything else - Frontend build or development proxy

pub mod config;
pub mod frontend_routes;
pub mod observability_routes;
pub mod relay_routes;
pub mod server;

pub use config::HttpServerConfig;
pub use server::{AppContext, HttpServer};
