use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::auth::TokenIssuer;
use crate::config::Config;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<Config>,
    pub tokens: TokenIssuer,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: Config) -> Self {
        let tokens = TokenIssuer::new(config.jwt_secret.as_bytes(), config.token_ttl_days);
        Self {
            db,
            config: Arc::new(config),
            tokens,
        }
    }
}
