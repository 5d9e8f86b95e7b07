use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::ApiQuery;
use crate::auth::{CurrentUser, MaybeUser};
use crate::error::Result;
use crate::service::{connections, listings, parse_enum};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/my/connections", get(my_connections))
        .route("/{id}", get(detail))
        .route("/{id}/connect", post(connect))
        .route("/{id}/disconnect", post(disconnect))
}

#[derive(Debug, Deserialize)]
struct CatalogQuery {
    #[serde(rename = "type")]
    server_type: Option<String>,
    category: Option<String>,
    search: Option<String>,
}

async fn list(State(state): State<AppState>, ApiQuery(query): ApiQuery<CatalogQuery>) -> Result<Json<Value>> {
    let filter = listings::CatalogFilter {
        server_type: parse_enum(query.server_type.as_deref()),
        category: parse_enum(query.category.as_deref()),
        status: None,
        search: query.search,
    };
    let servers = listings::list_public(&state.db, &filter).await?;
    Ok(Json(json!({ "servers": servers })))
}

async fn detail(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let viewer = viewer.as_ref().map(|user| user.id.as_str());
    let server = listings::detail(&state.db, &id, viewer).await?;
    Ok(Json(json!({ "server": server })))
}

async fn connect(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let credentials = connections::connect(&state.db, &user.id, &id).await?;
    Ok(Json(json!({
        "message": "Connected to server successfully",
        "connectionDetails": credentials,
    })))
}

async fn disconnect(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    connections::disconnect(&state.db, &user.id, &id).await?;
    Ok(Json(json!({ "message": "Disconnected from server successfully" })))
}

async fn my_connections(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Json<Value>> {
    let connections = connections::for_user(&state.db, &user.id).await?;
    Ok(Json(json!({ "connections": connections })))
}
