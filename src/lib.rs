//! # Ladybug Hosting
//!
//! A catalog of hosted servers (gaming, web, bot, database, storage and compute)
//! that users can browse, connect to and disconnect from, with an admin panel
//! for maintaining listings, accounts and connections.
//!
//! The crate is built on [axum](https://crates.io/crates/axum) for HTTP,
//! [Sea-ORM](https://crates.io/crates/sea-orm) for persistence and
//! [`tower-sessions`](https://crates.io/crates/tower-sessions) for cookie sessions,
//! whose records live in the same database through [`SeaOrmStore`].
//!
//! ## Capacity bookkeeping
//!
//! Each listing tracks `capacity.total` and `capacity.used`. Connecting claims a slot
//! and disconnecting releases it; both happen in a single transaction together with
//! the connection row, so `0 <= used <= total` holds under concurrent requests.
//!
//! ## Running
//!
//! ```no_run
//! use ladybug_hosting::{config::Config, db, routes, AppState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let conn = db::connect(&config.database).await?;
//! let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
//! axum::serve(listener, routes::app(AppState::new(conn, config))).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod migration;
pub mod routes;
pub mod service;
mod session_store;
mod state;

pub use error::AppError;
pub use session_store::SeaOrmStore;
pub use state::AppState;

/// Trait for implementing session store expiration cleanup
///
/// Re-exported from `tower-sessions`; [`SeaOrmStore`] implements it.
pub use tower_sessions::ExpiredDeletion;
