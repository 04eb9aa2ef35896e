//! # HTTP Server
//!
//! Main HTTP server combining all endpoint routers.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::config::HttpServerConfig;
use super::frontend_routes::frontend_routes;
use super::observability_routes::{health_routes, observability_routes, ObservabilityState};
use super::relay_routes::{relay_routes, RelayState};
use crate::observability::RelayMetrics;
use crate::realtime::BroadcastHub;
use crate::store::Store;

/// Handles the HTTP layer needs from the rest of the process
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn Store>,
    pub hub: BroadcastHub,
    pub metrics: Arc<RelayMetrics>,
    /// Stream served to subscribers that do not name one
    pub stream: String,
}

/// HTTP Server for the relay
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: HttpServerConfig, app: AppContext) -> Self {
        let router = Self::build_router(&config, app);
        Self { config, router }
    }

    /// Build the combined router with all endpoints
    fn build_router(config: &HttpServerConfig, app: AppContext) -> Router {
        let relay_state = Arc::new(RelayState {
            store: app.store,
            hub: app.hub.clone(),
            default_stream: app.stream,
            keep_alive: config.keep_alive(),
        });
        let observability_state = Arc::new(ObservabilityState {
            hub: app.hub,
            metrics: app.metrics,
        });

        let router = Router::new()
            // Health check at root level
            .merge(health_routes())
            .nest("/observability", observability_routes(observability_state))
            .nest("/api", relay_routes(relay_state))
            // Static files and the frontend fallback
            .merge(frontend_routes(config))
            .layer(TraceLayer::new_for_http());

        match Self::cors_layer(config) {
            Some(cors) => router.layer(cors),
            None => router,
        }
    }

    /// CORS is only installed when origins are configured.
    fn cors_layer(config: &HttpServerConfig) -> Option<CorsLayer> {
        if config.cors_origins.is_empty() {
            return None;
        }

        if config.cors_origins.iter().any(|origin| origin == "*") {
            return Some(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();

        Some(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any),
        )
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn start<F>(self, shutdown: F) -> Result<(), io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = self
            .config
            .socket_addr()
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(%addr, "relay http server listening");
        info!("events: http://{}/api/events", addr);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("relay http server stopped");
        Ok(())
    }
}
