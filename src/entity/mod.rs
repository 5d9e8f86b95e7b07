//! Database entity models for the hosting catalog.
//!
//! Every table the service touches is described here as a Sea-ORM entity.
//! The migrations in [`crate::migration`] derive their `CREATE TABLE`
//! statements from these definitions, so the structs are the single source
//! of truth for the schema.

/// Join rows recording which user occupies a capacity slot on which listing.
pub mod connection;

/// Hosted server listings, their capacity counters and access credentials.
pub mod server;

/// Persisted `tower-sessions` records used by [`crate::SeaOrmStore`].
pub mod session;

/// Registered accounts.
pub mod user;
