//! Capacity bookkeeping.
//!
//! A connection row and the listing's `capacity_used` counter always change
//! together inside one transaction. Slots are claimed with a conditional
//! update (`used < total`) and released with one floored at zero, so the
//! counter stays within `0..=total` even under concurrent requests.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    SqlErr, TransactionTrait,
};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::listings::Endpoint;
use crate::entity::connection::{self, ConnectionStatus};
use crate::entity::server::{self, Protocol, ServerStatus, ServerType};
use crate::entity::user;
use crate::error::{AppError, Result};

const TOKEN_LIFETIME_HOURS: i64 = 24;

/// Everything a user needs to log into the machine behind a listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub host: Option<String>,
    pub port: Option<i32>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub protocol: Protocol,
    pub auth_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedServer {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub server_type: ServerType,
    pub status: ServerStatus,
    pub connection_details: Endpoint,
}

/// An active connection as its owner sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MyConnection {
    pub id: String,
    pub connected_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub server: ConnectedServer,
}

/// Claims one slot of a public listing for `user_id`.
///
/// Fails with not found, already connected or full capacity, checked in that
/// order. Nothing is written unless every check passes.
pub async fn connect(db: &DatabaseConnection, user_id: &str, server_id: &str) -> Result<Credentials> {
    let txn = db.begin().await?;
    match claim_slot(&txn, user_id, server_id).await {
        Ok((credentials, connection_id)) => {
            txn.commit().await?;
            info!(user_id, server_id, %connection_id, "connected to listing");
            Ok(credentials)
        }
        Err(err) => {
            txn.rollback().await?;
            Err(err)
        }
    }
}

async fn claim_slot<C: ConnectionTrait>(
    txn: &C,
    user_id: &str,
    server_id: &str,
) -> Result<(Credentials, String)> {
    // The conditional increment is the first statement so that the write lock
    // is taken before anything is read.
    let claimed = server::Entity::update_many()
        .col_expr(
            server::Column::CapacityUsed,
            Expr::col(server::Column::CapacityUsed).add(1),
        )
        .col_expr(server::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(server::Column::Id.eq(server_id))
        .filter(server::Column::IsPublic.eq(true))
        .filter(Expr::col(server::Column::CapacityUsed).lt(Expr::col(server::Column::CapacityTotal)))
        .exec(txn)
        .await?;

    let server = server::Entity::find_by_id(server_id)
        .one(txn)
        .await?
        .filter(|server| server.is_public)
        .ok_or(AppError::NotFound("Server not found"))?;

    if find_pair(txn, user_id, server_id).await?.is_some() {
        return Err(AppError::AlreadyConnected);
    }

    if claimed.rows_affected == 0 {
        debug!(server_id, "listing is full");
        return Err(AppError::CapacityExhausted);
    }

    let now = Utc::now();
    let conn = connection::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        user_id: Set(user_id.to_owned()),
        server_id: Set(server_id.to_owned()),
        connected_at: Set(now),
        last_accessed: Set(now),
        status: Set(ConnectionStatus::Active),
        auth_token: Set(Uuid::new_v4().simple().to_string()),
        expires_at: Set(now + Duration::hours(TOKEN_LIFETIME_HOURS)),
    }
    .insert(txn)
    .await
    .map_err(|err| match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::AlreadyConnected,
        _ => err.into(),
    })?;

    let credentials = Credentials {
        host: server.host,
        port: server.port,
        username: server.access_username,
        password: server.access_password,
        protocol: server.protocol,
        auth_token: conn.auth_token,
    };
    Ok((credentials, conn.id))
}

/// Releases the slot `user_id` holds on a listing.
///
/// Works whether or not the listing is still public.
pub async fn disconnect(db: &DatabaseConnection, user_id: &str, server_id: &str) -> Result<()> {
    let txn = db.begin().await?;

    let removed = connection::Entity::delete_many()
        .filter(connection::Column::UserId.eq(user_id))
        .filter(connection::Column::ServerId.eq(server_id))
        .exec(&txn)
        .await?;
    if removed.rows_affected == 0 {
        txn.rollback().await?;
        return Err(AppError::NotConnected);
    }

    server::Entity::update_many()
        .col_expr(
            server::Column::CapacityUsed,
            Expr::col(server::Column::CapacityUsed).sub(1),
        )
        .col_expr(server::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(server::Column::Id.eq(server_id))
        .filter(server::Column::CapacityUsed.gt(0))
        .exec(&txn)
        .await?;

    txn.commit().await?;
    info!(user_id, server_id, "disconnected from listing");
    Ok(())
}

/// The user's active connection to a listing, if any.
pub async fn active_for<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    server_id: &str,
) -> Result<Option<connection::Model>> {
    Ok(find_pair(db, user_id, server_id)
        .await?
        .filter(|conn| conn.status == ConnectionStatus::Active))
}

/// Active connections of a user with the listings they point at, newest first.
pub async fn for_user<C: ConnectionTrait>(db: &C, user_id: &str) -> Result<Vec<MyConnection>> {
    let rows = connection::Entity::find()
        .filter(connection::Column::UserId.eq(user_id))
        .filter(connection::Column::Status.eq(ConnectionStatus::Active))
        .order_by_desc(connection::Column::ConnectedAt)
        .find_also_related(server::Entity)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(conn, server)| {
            let server = server?;
            Some(MyConnection {
                id: conn.id,
                connected_at: conn.connected_at,
                last_accessed: conn.last_accessed,
                server: ConnectedServer {
                    id: server.id,
                    name: server.name,
                    server_type: server.server_type,
                    status: server.status,
                    connection_details: Endpoint {
                        host: server.host,
                        port: server.port,
                        protocol: server.protocol,
                        connected_at: None,
                    },
                },
            })
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionUser {
    pub id: String,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionServer {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub server_type: ServerType,
    pub status: ServerStatus,
}

/// Admin view of a connection row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub id: String,
    pub user: Option<ConnectionUser>,
    pub server: Option<ConnectionServer>,
    pub connected_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub status: ConnectionStatus,
}

/// Every connection in the system, newest first.
pub async fn list_all<C: ConnectionTrait>(db: &C) -> Result<Vec<ConnectionRecord>> {
    let rows = connection::Entity::find()
        .order_by_desc(connection::Column::ConnectedAt)
        .find_also_related(user::Entity)
        .all(db)
        .await?;

    let server_ids: Vec<String> = rows.iter().map(|(conn, _)| conn.server_id.clone()).collect();
    let servers: HashMap<String, server::Model> = server::Entity::find()
        .filter(server::Column::Id.is_in(server_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|server| (server.id.clone(), server))
        .collect();

    Ok(rows
        .into_iter()
        .map(|(conn, user)| ConnectionRecord {
            user: user.map(|user| ConnectionUser {
                id: user.id,
                username: user.username,
                email: user.email,
            }),
            server: servers.get(&conn.server_id).map(|server| ConnectionServer {
                id: server.id.clone(),
                name: server.name.clone(),
                server_type: server.server_type,
                status: server.status,
            }),
            id: conn.id,
            connected_at: conn.connected_at,
            last_accessed: conn.last_accessed,
            status: conn.status,
        })
        .collect())
}

async fn find_pair<C: ConnectionTrait>(db: &C, user_id: &str, server_id: &str) -> Result<Option<connection::Model>> {
    Ok(connection::Entity::find()
        .filter(connection::Column::UserId.eq(user_id))
        .filter(connection::Column::ServerId.eq(server_id))
        .one(db)
        .await?)
}
