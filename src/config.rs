//! Environment-driven configuration.
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file by the binary. Every setting except `DATABASE_URL` has a default.

use std::{env, fmt::Display, net::SocketAddr, str::FromStr};

use thiserror::Error;
use tracing::{info, warn};

const DEV_JWT_SECRET: &str = "ladybug-secret";
const DEFAULT_ADMIN: &str = "Ntando";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 2,
        }
    }
}

/// The one credential pair that unlocks the admin panel.
#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl AdminCredentials {
    pub fn matches(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password == password
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub production: bool,
    pub database: DatabaseConfig,
    pub session_ttl_hours: i64,
    pub session_cleanup_secs: u64,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub admin: AdminCredentials,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let host: String = try_load("HOST", "0.0.0.0")?;
        let port: u16 = try_load("PORT", "3000")?;
        let bind_addr = format!("{host}:{port}")
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: "HOST",
                reason: e.to_string(),
            })?;

        let production = try_load::<String>("APP_ENV", "development")? == "production";

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) => secret,
            Err(_) if production => return Err(ConfigError::Missing("JWT_SECRET")),
            Err(_) => {
                warn!("JWT_SECRET not set, using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        Ok(Self {
            bind_addr,
            production,
            database: DatabaseConfig {
                url: database_url,
                max_connections: try_load("DB_MAX_CONNECTIONS", "10")?,
                min_connections: try_load("DB_MIN_CONNECTIONS", "2")?,
            },
            session_ttl_hours: try_load("SESSION_TTL_HOURS", "24")?,
            session_cleanup_secs: try_load("SESSION_CLEANUP_SECS", "3600")?,
            jwt_secret,
            token_ttl_days: try_load("TOKEN_TTL_DAYS", "7")?,
            admin: AdminCredentials {
                username: try_load("ADMIN_USERNAME", DEFAULT_ADMIN)?,
                password: env::var("ADMIN_PASSWORD").unwrap_or_else(|_| DEFAULT_ADMIN.to_string()),
            },
        })
    }

    /// Development settings around the given database, with no environment lookups.
    pub fn with_database(database: DatabaseConfig) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            production: false,
            database,
            session_ttl_hours: 24,
            session_cleanup_secs: 3600,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_days: 7,
            admin: AdminCredentials {
                username: DEFAULT_ADMIN.to_string(),
                password: DEFAULT_ADMIN.to_string(),
            },
        }
    }
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_credentials_require_both_parts() {
        let admin = AdminCredentials {
            username: "root".into(),
            password: "hunter2".into(),
        };
        assert!(admin.matches("root", "hunter2"));
        assert!(!admin.matches("root", "hunter3"));
        assert!(!admin.matches("Root", "hunter2"));
    }

    #[test]
    fn development_defaults() {
        let config = Config::with_database(DatabaseConfig::new("sqlite::memory:"));
        assert!(!config.production);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.session_ttl_hours, 24);
        assert_eq!(config.token_ttl_days, 7);
    }
}
