use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::entity::user::{self, Role};
use crate::error::{AppError, Result};

const USER_KEY: &str = "user";
const ADMIN_KEY: &str = "admin";

/// Identity of a logged-in user as kept in the session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub username: String,
    pub role: Role,
}

impl SessionUser {
    /// Binds `user` to the session under a fresh session id.
    pub async fn establish(session: &Session, user: &user::Model) -> Result<()> {
        session.cycle_id().await?;
        session
            .insert(
                USER_KEY,
                SessionUser {
                    id: user.id.clone(),
                    username: user.username.clone(),
                    role: user.role,
                },
            )
            .await?;
        Ok(())
    }
}

/// Session user if there is one.
pub struct MaybeUser(pub Option<SessionUser>);

/// Session user, or `401 Authentication required`.
pub struct CurrentUser(pub SessionUser);

/// The admin flag. Every admin route except login and logout extracts it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminSession {
    pub username: String,
}

impl AdminSession {
    /// Marks the session as an admin session under a fresh session id.
    pub async fn grant(session: &Session, username: &str) -> Result<()> {
        session.cycle_id().await?;
        session
            .insert(
                ADMIN_KEY,
                AdminSession {
                    username: username.to_string(),
                },
            )
            .await?;
        Ok(())
    }
}

async fn session_from_parts<S>(parts: &mut Parts, state: &S) -> Result<Session>
where
    S: Send + Sync,
{
    Session::from_request_parts(parts, state)
        .await
        .map_err(|(_, msg)| AppError::Internal(msg.to_string()))
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = session_from_parts(parts, state).await?;
        Ok(Self(session.get::<SessionUser>(USER_KEY).await?))
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let MaybeUser(user) = MaybeUser::from_request_parts(parts, state).await?;
        user.map(Self)
            .ok_or(AppError::Unauthorized("Authentication required"))
    }
}

impl<S> FromRequestParts<S> for AdminSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = session_from_parts(parts, state).await?;
        session
            .get::<AdminSession>(ADMIN_KEY)
            .await?
            .ok_or(AppError::Unauthorized("Admin access required"))
    }
}
