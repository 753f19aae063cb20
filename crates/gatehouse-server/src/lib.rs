//! Gatehouse server library logic.
//!
//! Exposes the engine over HTTP. The ledger posts records for admission and
//! withdrawal; operators change bindings, titles and roles; anyone may query
//! the stores and the decision log.

pub mod api;
pub mod api_query;
pub mod config;
pub mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Extension, Json, Router,
};
use gatehouse_db::DbPool;
use gatehouse_engine::Engine;
use gatehouse_observe::EventPayload;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower_http::trace::TraceLayer;

/// Upper bound on request bodies. Records are small JSON documents.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// The engine. One lock serializes every submission, withdrawal and
    /// administrative change.
    pub engine: Arc<Mutex<Engine>>,
}

impl AppState {
    /// Wraps a pool and an engine already restored from it.
    pub fn new(pool: DbPool, engine: Engine) -> Self {
        Self {
            pool,
            engine: Arc::new(Mutex::new(engine)),
        }
    }
}

/// Appends payloads to the decision log.
///
/// Failures are logged as warnings and never fail the request: the engine
/// decision is already committed by the time its events are written.
pub fn record_events(conn: &rusqlite::Connection, payloads: &[EventPayload]) {
    if payloads.is_empty() {
        return;
    }
    if let Err(e) = gatehouse_observe::emit_events(conn, payloads) {
        tracing::warn!(
            count = payloads.len(),
            first = payloads[0].event_type(),
            "failed to write decision log events: {}",
            e
        );
    }
}

/// Health check handler.
///
/// Returns `200 OK` with server status and version.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let caller_routes = Router::new()
        .route("/api/records", post(api::submit_record_handler))
        .route(
            "/api/records/{uid}/withdraw",
            post(api::withdraw_record_handler),
        )
        .route("/api/admin/bindings", put(api::bind_schema_handler))
        .route("/api/admin/titles", put(api::set_title_handler))
        .route("/api/admin/roles/grant", post(api::grant_role_handler))
        .route("/api/admin/roles/revoke", post(api::revoke_role_handler))
        .route("/api/transfers", post(api::transfer_handler))
        .layer(axum::middleware::from_fn(middleware::caller_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/api/records/{uid}", get(api::get_record_handler))
        .route("/api/roles/{role}", get(api_query::role_members_handler))
        .route(
            "/api/roles/{role}/{address}",
            get(api_query::has_role_handler),
        )
        .route("/api/bindings", get(api_query::list_bindings_handler))
        .route(
            "/api/bindings/{schema}",
            get(api_query::resolve_binding_handler),
        )
        .route("/api/titles", get(api_query::list_titles_handler))
        .route("/api/titles/check", get(api_query::check_title_handler))
        .route(
            "/api/participants/{address}",
            get(api_query::participant_handler),
        )
        .route("/api/replies/{uid}", get(api_query::reply_handler))
        .route("/api/events", get(api_query::get_events_handler))
        .merge(caller_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
