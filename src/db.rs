//! Database pool setup and schema migration.

use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::migration::Migrator;

/// Opens the pool described by `config` and brings the schema up to date.
///
/// In-memory SQLite databases live and die with their connection, so for those
/// the pool is pinned to a single connection.
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(config.url.clone());
    opt.connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    if is_in_memory(&config.url) {
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .idle_timeout(Duration::from_secs(10 * 60))
            .max_lifetime(Duration::from_secs(30 * 60));
    }

    let db = Database::connect(opt).await?;
    info!(backend = ?db.get_database_backend(), "connected to database");

    Migrator::up(&db, None).await?;
    info!("database schema is up to date");

    Ok(db)
}

/// A fresh, migrated in-memory SQLite database.
///
/// Requires the `sqlx-sqlite` driver, which the test builds always enable.
pub async fn connect_in_memory() -> Result<DatabaseConnection, DbErr> {
    connect(&DatabaseConfig::new("sqlite::memory:")).await
}

fn is_in_memory(url: &str) -> bool {
    url.starts_with("sqlite") && (url.contains(":memory:") || url.contains("mode=memory"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_in_memory_sqlite_urls() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://file.db?mode=memory"));
        assert!(!is_in_memory("sqlite://ladybug.db?mode=rwc"));
        assert!(!is_in_memory("postgres://localhost/ladybug"));
    }
}
