use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set, TransactionTrait};
use time::OffsetDateTime;
use tower_sessions::session::{Id, Record};
use tower_sessions::{session_store, ExpiredDeletion, SessionStore};
use tracing::debug;

use crate::entity::session::{self, Entity as Sessions};

/// `tower-sessions` storage in the application database.
///
/// Records go to the `sessions` table as MessagePack blobs, next to the rest
/// of the schema, so the pool shared with the services serves sessions too.
/// Rows past their expiry date are never returned by [`SessionStore::load`]
/// and are purged by [`ExpiredDeletion::delete_expired`].
///
/// ```no_run
/// use ladybug_hosting::SeaOrmStore;
/// use time::Duration;
/// use tower_sessions::{Expiry, SessionManagerLayer};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let conn = ladybug_hosting::db::connect_in_memory().await?;
/// let _layer = SessionManagerLayer::new(SeaOrmStore::new(conn))
///     .with_expiry(Expiry::OnInactivity(Duration::hours(24)));
/// # Ok(())
/// # }
/// ```
///
/// Failures surface as `session_store::Error`: `Backend` for the database,
/// `Encode`/`Decode` for the payload and for expiry dates chrono cannot hold.
#[derive(Debug, Clone)]
pub struct SeaOrmStore {
    conn: DatabaseConnection,
}

impl SeaOrmStore {
    /// The connection must already be migrated.
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SessionStore for SeaOrmStore {
    /// Inserts `record`, drawing fresh ids until one is unused.
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        let txn = self.conn.begin().await.map_err(backend)?;

        while Sessions::find_by_id(record.id.to_string())
            .one(&txn)
            .await
            .map_err(backend)?
            .is_some()
        {
            record.id = Id::default();
        }

        Sessions::insert(row(record)?).exec(&txn).await.map_err(backend)?;
        txn.commit().await.map_err(backend)
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        Sessions::insert(row(record)?)
            .on_conflict(
                OnConflict::column(session::Column::Id)
                    .update_columns([session::Column::Data, session::Column::ExpiryDate])
                    .to_owned(),
            )
            .exec(&self.conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        let Some(stored) = Sessions::find_by_id(session_id.to_string())
            .filter(session::Column::ExpiryDate.gt(Utc::now()))
            .one(&self.conn)
            .await
            .map_err(backend)?
        else {
            return Ok(None);
        };

        rmp_serde::from_slice(&stored.data)
            .map(Some)
            .map_err(|e| session_store::Error::Decode(e.to_string()))
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        Sessions::delete_by_id(session_id.to_string())
            .exec(&self.conn)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl ExpiredDeletion for SeaOrmStore {
    async fn delete_expired(&self) -> session_store::Result<()> {
        let purged = Sessions::delete_many()
            .filter(session::Column::ExpiryDate.lt(Utc::now()))
            .exec(&self.conn)
            .await
            .map_err(backend)?;
        debug!(sessions = purged.rows_affected, "purged expired sessions");
        Ok(())
    }
}

fn row(record: &Record) -> session_store::Result<session::ActiveModel> {
    let data = rmp_serde::to_vec(record).map_err(|e| session_store::Error::Encode(e.to_string()))?;
    Ok(session::ActiveModel {
        id: Set(record.id.to_string()),
        data: Set(data),
        expiry_date: Set(to_chrono(record.expiry_date)?),
    })
}

fn backend(err: DbErr) -> session_store::Error {
    session_store::Error::Backend(err.to_string())
}

fn to_chrono(time: OffsetDateTime) -> session_store::Result<DateTime<Utc>> {
    DateTime::from_timestamp(time.unix_timestamp(), time.nanosecond())
        .ok_or_else(|| session_store::Error::Encode(format!("expiry date {time} is out of range")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::db;

    fn record(expiry_date: OffsetDateTime) -> Record {
        let mut data = HashMap::new();
        data.insert("user".to_string(), serde_json::json!({ "id": "u-1" }));
        Record {
            id: Id::default(),
            data,
            expiry_date,
        }
    }

    #[tokio::test]
    async fn create_then_load_round_trips() {
        let store = SeaOrmStore::new(db::connect_in_memory().await.unwrap());
        let mut rec = record(OffsetDateTime::now_utc() + time::Duration::hours(1));

        store.create(&mut rec).await.unwrap();
        let loaded = store.load(&rec.id).await.unwrap().unwrap();

        assert_eq!(loaded.id, rec.id);
        assert_eq!(loaded.data, rec.data);
    }

    #[tokio::test]
    async fn save_overwrites_existing_record() {
        let store = SeaOrmStore::new(db::connect_in_memory().await.unwrap());
        let mut rec = record(OffsetDateTime::now_utc() + time::Duration::hours(1));
        store.create(&mut rec).await.unwrap();

        rec.data
            .insert("admin".to_string(), serde_json::json!({ "username": "root" }));
        store.save(&rec).await.unwrap();

        let loaded = store.load(&rec.id).await.unwrap().unwrap();
        assert!(loaded.data.contains_key("admin"));
    }

    #[tokio::test]
    async fn expired_sessions_are_invisible_and_deleted() {
        let conn = db::connect_in_memory().await.unwrap();
        let store = SeaOrmStore::new(conn.clone());
        let expired = record(OffsetDateTime::now_utc() - time::Duration::minutes(5));
        store.save(&expired).await.unwrap();

        assert!(store.load(&expired.id).await.unwrap().is_none());

        store.delete_expired().await.unwrap();
        let remaining = Sessions::find().all(&conn).await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_session() {
        let store = SeaOrmStore::new(db::connect_in_memory().await.unwrap());
        let mut rec = record(OffsetDateTime::now_utc() + time::Duration::hours(1));
        store.create(&mut rec).await.unwrap();

        store.delete(&rec.id).await.unwrap();
        assert!(store.load(&rec.id).await.unwrap().is_none());
    }
}
