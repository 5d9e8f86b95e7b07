//! Application error type and its HTTP mapping.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// Everything a request can fail with.
///
/// Client errors render their message; internal errors are logged and
/// answered with a generic body so that driver details never leak.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("User already exists")]
    UserExists,

    #[error("Already connected to this server")]
    AlreadyConnected,

    #[error("Server is at full capacity")]
    CapacityExhausted,

    #[error("Connection not found")]
    NotConnected,

    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::UserExists | Self::AlreadyConnected | Self::CapacityExhausted => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) | Self::NotConnected => StatusCode::NOT_FOUND,
            Self::Database(_) | Self::Session(_) | Self::Token(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_keep_their_message() {
        let err = AppError::CapacityExhausted;
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Server is at full capacity");
        assert_eq!(AppError::NotConnected.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Unauthorized("Admin access required").status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn database_errors_are_internal() {
        let err = AppError::from(DbErr::Custom("boom".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
