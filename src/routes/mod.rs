//! HTTP surface: `/api/auth`, `/api/servers` and `/api/admin`.

mod admin;
mod auth;
mod servers;

use axum::{
    extract::{DefaultBodyLimit, FromRequest, FromRequestParts},
    Router,
};
use time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{Expiry, SessionManagerLayer};

use crate::error::AppError;
use crate::session_store::SeaOrmStore;
use crate::state::AppState;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "ladybug.sid";

const BODY_LIMIT: usize = 10 * 1024 * 1024;

/// `axum::Json` answering malformed bodies with the usual `{"error": ...}` shape.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Query` with JSON error bodies.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// Builds the complete application, session handling included.
pub fn app(state: AppState) -> Router {
    let session_layer = SessionManagerLayer::new(SeaOrmStore::new(state.db.clone()))
        .with_name(SESSION_COOKIE)
        .with_secure(state.config.production)
        .with_expiry(Expiry::OnInactivity(Duration::hours(state.config.session_ttl_hours)));

    let router = Router::new()
        .nest("/api/auth", auth::routes())
        .nest("/api/servers", servers::routes())
        .nest("/api/admin", admin::routes())
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(session_layer)
        .layer(TraceLayer::new_for_http());

    let router = if state.config.production {
        router
    } else {
        router.layer(CorsLayer::very_permissive())
    };

    router.with_state(state)
}

async fn not_found() -> AppError {
    AppError::NotFound("Route not found")
}
