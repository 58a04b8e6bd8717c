//! # arbor-api
//!
//! HTTP API for Arbor: the organisation → team → client → episode hierarchy,
//! its notes and their attachments.
//!
//! The binary (`src/main.rs`) reads [`ServerConfig`], connects the
//! [`Database`] and serves [`router`].

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use arbor_db::Database;

pub mod config;
pub mod error;
pub mod handlers;

pub use config::ServerConfig;
pub use error::ApiError;

use handlers::{attachments, hierarchy, notes};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

/// Request ids are UUIDv7 so they sort by arrival.
#[derive(Clone, Copy, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Origins for the CORS allow-list. Entries that are not valid header
/// values are logged and skipped.
pub fn parse_allowed_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("Invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect()
}

/// Request span carrying the id set by `SetRequestIdLayer`.
fn request_span(request: &axum::http::Request<axum::body::Body>) -> tracing::Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Build the application router with its middleware stack.
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    let body_limit = config.body_limit_bytes();
    let allowed_origins = parse_allowed_origins(&config.allowed_origins);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/health", get(health_check))
        // Hierarchy
        .route(
            "/api/v1/hierarchy",
            get(hierarchy::get_tree).post(hierarchy::create_node),
        )
        .route(
            "/api/v1/hierarchy/:id",
            get(hierarchy::get_node)
                .put(hierarchy::rename_node)
                .delete(hierarchy::delete_node),
        )
        .route("/api/v1/hierarchy/:id/children", get(hierarchy::get_children))
        .route(
            "/api/v1/hierarchy/:id/ancestors",
            get(hierarchy::get_ancestors),
        )
        .route("/api/v1/hierarchy/:id/subtree", get(hierarchy::get_subtree))
        .route("/api/v1/hierarchy/:id/notes", get(notes::list_for_node))
        // Notes
        .route("/api/v1/notes", post(notes::create_note))
        .route(
            "/api/v1/notes/:id",
            get(notes::get_note)
                .put(notes::update_note)
                .delete(notes::delete_note),
        )
        // Attachments
        .route(
            "/api/v1/notes/:id/attachments",
            get(attachments::list_for_note).post(attachments::upload),
        )
        .route(
            "/api/v1/attachments/:id/download",
            get(attachments::download),
        )
        .route(
            "/api/v1/attachments/:id",
            delete(attachments::delete_attachment),
        )
        // Type listing: organisations, teams, clients, episodes
        .route("/api/v1/:plural", get(hierarchy::list_by_type))
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(allowed_origins))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
                .allow_credentials(true)
                .max_age(Duration::from_secs(3600)),
        )
        .with_state(state)
}
