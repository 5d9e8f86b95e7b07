use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use sea_orm::ActiveEnum;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_sessions::Session;
use tracing::{info, warn};

use super::{ApiJson, ApiQuery};
use crate::auth::AdminSession;
use crate::error::{AppError, Result};
use crate::service::listings::{self, CatalogFilter, ListingPatch, NewListing};
use crate::service::{admin, connections, parse_enum, PageRequest};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/dashboard", get(dashboard))
        .route("/users", get(users))
        .route("/servers", get(servers).post(create_server))
        .route("/servers/{id}", put(update_server).delete(delete_server))
        .route("/servers/{id}/toggle-status", post(toggle_status))
        .route("/connections", get(all_connections))
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct UsersQuery {
    page: Option<u64>,
    limit: Option<u64>,
    search: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServersQuery {
    page: Option<u64>,
    limit: Option<u64>,
    #[serde(rename = "type")]
    server_type: Option<String>,
    status: Option<String>,
    search: Option<String>,
}

async fn login(
    State(state): State<AppState>,
    session: Session,
    ApiJson(body): ApiJson<LoginBody>,
) -> Result<Json<Value>> {
    if !state.config.admin.matches(&body.username, &body.password) {
        warn!(username = %body.username, "rejected admin login");
        return Err(AppError::Unauthorized("Invalid admin credentials"));
    }

    AdminSession::grant(&session, &body.username).await?;
    info!(username = %body.username, "admin logged in");

    Ok(Json(json!({
        "message": "Admin login successful",
        "admin": { "username": body.username },
    })))
}

async fn logout(session: Session) -> Result<Json<Value>> {
    session.flush().await?;
    Ok(Json(json!({ "message": "Admin logout successful" })))
}

async fn dashboard(_admin: AdminSession, State(state): State<AppState>) -> Result<Json<admin::Dashboard>> {
    Ok(Json(admin::dashboard(&state.db).await?))
}

async fn users(
    _admin: AdminSession,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<UsersQuery>,
) -> Result<Json<Value>> {
    let page = admin::list_users(
        &state.db,
        query.search.as_deref(),
        PageRequest::new(query.page, query.limit),
    )
    .await?;

    Ok(Json(json!({
        "users": page.items,
        "pagination": page.pagination,
    })))
}

async fn servers(
    _admin: AdminSession,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ServersQuery>,
) -> Result<Json<Value>> {
    let filter = CatalogFilter {
        server_type: parse_enum(query.server_type.as_deref()),
        category: None,
        status: parse_enum(query.status.as_deref()),
        search: query.search,
    };
    let page = listings::list_admin(&state.db, &filter, PageRequest::new(query.page, query.limit)).await?;

    Ok(Json(json!({
        "servers": page.items,
        "pagination": page.pagination,
    })))
}

async fn create_server(
    _admin: AdminSession,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewListing>,
) -> Result<(StatusCode, Json<Value>)> {
    let server = listings::create(&state.db, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Server created successfully",
            "server": server,
        })),
    ))
}

async fn update_server(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<ListingPatch>,
) -> Result<Json<Value>> {
    let server = listings::update(&state.db, &id, patch).await?;
    Ok(Json(json!({
        "message": "Server updated successfully",
        "server": server,
    })))
}

async fn delete_server(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    listings::delete(&state.db, &id).await?;
    Ok(Json(json!({ "message": "Server deleted successfully" })))
}

async fn toggle_status(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let status = listings::toggle_status(&state.db, &id).await?;
    Ok(Json(json!({
        "message": format!("Server status changed to {}", status.to_value()),
        "status": status,
    })))
}

async fn all_connections(_admin: AdminSession, State(state): State<AppState>) -> Result<Json<Value>> {
    let connections = connections::list_all(&state.db).await?;
    Ok(Json(json!({ "connections": connections })))
}
