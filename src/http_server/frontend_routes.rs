//! Frontend HTTP Routes
//!
//! `/static/*` is always served from the static directory. Every other
//! unmatched path goes either to the prebuilt frontend directory or, when a
//! development server is configured, through a reverse proxy to it.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tower_http::services::ServeDir;
use tracing::warn;

use super::config::HttpServerConfig;

/// Largest request body forwarded to the development server
const MAX_PROXY_BODY: usize = 16 * 1024 * 1024;

/// Headers owned by a single connection; never forwarded
const HOP_BY_HOP: &[HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Reverse proxy target
pub struct ProxyState {
    upstream: String,
    client: reqwest::Client,
}

impl ProxyState {
    pub fn new(upstream: impl Into<String>) -> Self {
        Self {
            upstream: upstream.into().trim_end_matches('/').to_string(),
            // The development server is local; never route it through a
            // system proxy.
            client: reqwest::Client::builder()
                .no_proxy()
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

/// Create frontend routes (merged at the root, carries the fallback)
pub fn frontend_routes(config: &HttpServerConfig) -> Router {
    let static_files = ServeDir::new(&config.static_dir);

    match &config.dev_proxy_url {
        Some(upstream) => Router::new()
            .nest_service("/static", static_files)
            .fallback(proxy_handler)
            .with_state(Arc::new(ProxyState::new(upstream.as_str()))),
        None => Router::new()
            .nest_service("/static", static_files)
            .fallback_service(ServeDir::new(&config.frontend_dir)),
    }
}

/// Forward the request to the development server and mirror its answer.
async fn proxy_handler(State(proxy): State<Arc<ProxyState>>, request: Request) -> Response {
    match forward(&proxy, request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(upstream = %proxy.upstream, error = %e, "dev proxy request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e).into_response()
        }
    }
}

async fn forward(proxy: &ProxyState, request: Request) -> Result<Response, String> {
    let (parts, body) = request.into_parts();
    let target = match parts.uri.path_and_query() {
        Some(path) => format!("{}{}", proxy.upstream, path.as_str()),
        None => format!("{}{}", proxy.upstream, parts.uri.path()),
    };

    let body = to_bytes(body, MAX_PROXY_BODY)
        .await
        .map_err(|e| format!("failed to read request body: {}", e))?;

    let upstream = proxy
        .client
        .request(parts.method, target)
        .headers(forwarded_headers(&parts.headers, true))
        .body(body)
        .send()
        .await
        .map_err(|e| format!("upstream unreachable: {}", e))?;

    let status = upstream.status();
    let headers = forwarded_headers(upstream.headers(), false);
    let bytes = upstream
        .bytes()
        .await
        .map_err(|e| format!("failed to read upstream body: {}", e))?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Copy the first value of every end-to-end header.
fn forwarded_headers(source: &HeaderMap, outbound: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for name in source.keys() {
        if HOP_BY_HOP.contains(name) {
            continue;
        }
        // Host and length describe the inbound connection; the client
        // recomputes both for the upstream request.
        if outbound && (*name == header::HOST || *name == header::CONTENT_LENGTH) {
            continue;
        }
        if let Some(value) = source.get(name) {
            headers.insert(name.clone(), value.clone());
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_forwarded_headers_single_value() {
        let mut source = HeaderMap::new();
        source.append("x-trace", HeaderValue::from_static("one"));
        source.append("x-trace", HeaderValue::from_static("two"));
        source.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        source.insert(header::HOST, HeaderValue::from_static("localhost:8080"));

        let outbound = forwarded_headers(&source, true);
        assert_eq!(outbound.get_all("x-trace").iter().count(), 1);
        assert_eq!(outbound.get("x-trace").unwrap(), "one");
        assert!(outbound.get(header::CONNECTION).is_none());
        assert!(outbound.get(header::HOST).is_none());

        let inbound = forwarded_headers(&source, false);
        assert!(inbound.get(header::HOST).is_some());
    }

    #[test]
    fn test_upstream_trailing_slash_trimmed() {
        let proxy = ProxyState::new("http://localhost:5173/");
        assert_eq!(proxy.upstream, "http://localhost:5173");
    }
}
