//! HTTP interception server
//!
//! Every request lands in [`intercept`]. Sticker image requests go through
//! the cache policy; everything else is forwarded to the origin untouched.
//! `/_worker/health` reports uptime, store and policy statistics.

use crate::policy::{PolicyError, Served, StickerPolicy};
use crate::proxy::{forwardable_headers, Upstream};
use crate::types::{FetchedResponse, HealthResponse, InterceptedRequest};
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use sticker_store::{CachedAsset, StickerStore};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Largest request body the worker will buffer before forwarding
const MAX_REQUEST_BODY: usize = 16 * 1024 * 1024;

/// Shared state for the HTTP server
pub struct ServerState {
    pub store: Arc<StickerStore>,
    pub policy: StickerPolicy,
    pub upstream: Arc<dyn Upstream>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(
        store: Arc<StickerStore>,
        policy: StickerPolicy,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        Self {
            store,
            policy,
            upstream,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/_worker/health", get(health))
        .fallback(intercept)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn start_server<F>(state: SharedState, port: u16, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    let (status, store) = match state.store.stats().await {
        Ok(stats) => ("ok", stats),
        Err(e) => {
            warn!(error = %e, "Sticker store unavailable for health check");
            ("degraded", Default::default())
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        uptime_secs,
        store,
        policy: state.policy.stats(),
    })
}

/// Entry point for every request that is not a worker endpoint
async fn intercept(State(state): State<SharedState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_REQUEST_BODY).await {
        Ok(body) => body,
        Err(e) => {
            warn!(uri = %parts.uri, error = %e, "Failed to read request body");
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
        }
    };
    let request = InterceptedRequest {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body,
    };

    if !state.policy.intercepts(&request) {
        return passthrough(&state, &request).await;
    }

    match state.policy.handle(&request).await {
        Ok(Served::Cached(asset)) => cached_response(asset),
        // The persist task keeps running after its handle is dropped
        Ok(Served::Network { response, .. }) => network_response(response),
        Err(PolicyError::Network(e)) => {
            error!(path = %request.path(), error = %e, "Failed to fetch sticker");
            error_response(StatusCode::BAD_GATEWAY, "Upstream unavailable")
        }
        Err(PolicyError::Store(e)) => {
            error!(path = %request.path(), error = %e, "Sticker store unavailable");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Sticker store unavailable")
        }
    }
}

/// Forward a request the policy does not handle. The store is not touched.
async fn passthrough(state: &ServerState, request: &InterceptedRequest) -> Response {
    match state.upstream.fetch(request).await {
        Ok(response) => network_response(response),
        Err(e) => {
            warn!(uri = %request.uri, error = %e, "Passthrough request failed");
            error_response(StatusCode::BAD_GATEWAY, "Upstream unavailable")
        }
    }
}

fn cached_response(asset: CachedAsset) -> Response {
    let mut response = Response::new(Body::from(asset.payload.data));
    let headers = response.headers_mut();
    if let Some(value) = asset
        .payload
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert("x-sticker-cache", HeaderValue::from_static("HIT"));
    response
}

fn network_response(fetched: FetchedResponse) -> Response {
    let mut response = Response::new(Body::from(fetched.body));
    *response.status_mut() = fetched.status;
    *response.headers_mut() = forwardable_headers(&fetched.headers);
    response
}
