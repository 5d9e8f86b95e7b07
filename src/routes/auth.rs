use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_sessions::Session;
use tracing::info;

use super::ApiJson;
use crate::auth::{MaybeUser, SessionUser};
use crate::error::{AppError, Result};
use crate::service::users::{self, Registration, UserView};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

#[derive(Debug, Deserialize)]
struct RegisterBody {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    /// Username or email.
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

async fn register(
    State(state): State<AppState>,
    session: Session,
    ApiJson(body): ApiJson<RegisterBody>,
) -> Result<(StatusCode, Json<Value>)> {
    let user = users::register(
        &state.db,
        Registration {
            username: body.username,
            email: body.email,
            password: body.password,
        },
    )
    .await?;

    let token = state.tokens.issue(&user)?;
    SessionUser::establish(&session, &user).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "token": token,
            "user": UserView::from(&user),
        })),
    ))
}

async fn login(
    State(state): State<AppState>,
    session: Session,
    ApiJson(body): ApiJson<LoginBody>,
) -> Result<Json<Value>> {
    if body.username.is_empty() || body.password.is_empty() {
        return Err(AppError::BadRequest(
            "Username and password are required".into(),
        ));
    }

    let user = users::authenticate(&state.db, &body.username, &body.password).await?;
    let token = state.tokens.issue(&user)?;
    SessionUser::establish(&session, &user).await?;
    info!(user_id = %user.id, "user logged in");

    Ok(Json(json!({
        "message": "Login successful",
        "token": token,
        "user": UserView::from(&user),
    })))
}

async fn logout(session: Session) -> Result<Json<Value>> {
    session.flush().await?;
    Ok(Json(json!({ "message": "Logout successful" })))
}

async fn me(State(state): State<AppState>, MaybeUser(current): MaybeUser) -> Result<Json<Value>> {
    let current = current.ok_or(AppError::Unauthorized("Not authenticated"))?;
    let user = users::find_by_id(&state.db, &current.id)
        .await?
        .ok_or(AppError::NotFound("User not found"))?;

    Ok(Json(json!({ "user": UserView::from(&user) })))
}
