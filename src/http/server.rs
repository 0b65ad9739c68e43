//! HTTP router setup.
//!
//! # Responsibilities
//! - Create the Axum router with built-in and caller-supplied routes
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Share configuration and resource handles with handlers

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::http::request::{RequestIdExt, UuidRequestId, X_REQUEST_ID};
use crate::http::response::json;
use crate::resource::{Cache, Database};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub cache: Cache,
}

/// Build the router: `/health` plus `routes`, under the middleware stack.
#[allow(deprecated)]
pub fn build_router(state: AppState, routes: Router<AppState>) -> Router {
    let request_timeout = Duration::from_secs(state.config.http.request_timeout_secs);
    let max_body_size = state.config.http.max_body_size;

    // Last layer added runs first: the ID must exist before the trace span.
    Router::new()
        .route("/health", get(health))
        .merge(routes)
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %req.method(),
                uri = %req.uri(),
                request_id = %req.request_id(),
            )
        }))
        .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
}

/// Liveness endpoint.
async fn health(State(state): State<AppState>) -> Response {
    tracing::trace!(
        service = %state.config.app.name,
        db = state.db.is_enabled(),
        cache = state.cache.is_enabled(),
        "Health check"
    );
    json(StatusCode::OK, serde_json::json!({ "ok": true }))
}
