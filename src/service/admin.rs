//! Read models behind the admin panel.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Condition;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::Serialize;

use super::{contains_ci, fetch_page, Page, PageRequest};
use crate::entity::connection::{self, ConnectionStatus};
use crate::entity::server::{self, ServerStatus, ServerType};
use crate::entity::user::{self, Role};
use crate::error::Result;

const RECENT: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_users: u64,
    pub total_servers: u64,
    pub active_connections: u64,
    pub free_servers: u64,
    pub paid_servers: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentServer {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub server_type: ServerType,
    pub status: ServerStatus,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Account as admins see it: everything but the password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<user::Model> for AdminUser {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            is_active: user.is_active,
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub stats: Stats,
    pub recent_servers: Vec<RecentServer>,
    pub recent_users: Vec<AdminUser>,
}

/// Counts and the most recent servers and users for the admin dashboard.
pub async fn dashboard<C: ConnectionTrait>(db: &C) -> Result<Dashboard> {
    let stats = Stats {
        total_users: user::Entity::find().count(db).await?,
        total_servers: server::Entity::find().count(db).await?,
        active_connections: connection::Entity::find()
            .filter(connection::Column::Status.eq(ConnectionStatus::Active))
            .count(db)
            .await?,
        free_servers: server::Entity::find()
            .filter(server::Column::ServerType.eq(ServerType::Free))
            .count(db)
            .await?,
        paid_servers: server::Entity::find()
            .filter(server::Column::ServerType.eq(ServerType::Paid))
            .count(db)
            .await?,
    };

    let recent_servers = server::Entity::find()
        .order_by_desc(server::Column::CreatedAt)
        .limit(RECENT)
        .find_also_related(user::Entity)
        .all(db)
        .await?
        .into_iter()
        .map(|(server, owner)| RecentServer {
            id: server.id,
            name: server.name,
            server_type: server.server_type,
            status: server.status,
            owner: owner.map(|owner| owner.username),
            created_at: server.created_at,
        })
        .collect();

    let recent_users = user::Entity::find()
        .order_by_desc(user::Column::CreatedAt)
        .limit(RECENT)
        .all(db)
        .await?
        .into_iter()
        .map(AdminUser::from)
        .collect();

    Ok(Dashboard {
        stats,
        recent_servers,
        recent_users,
    })
}

/// Accounts newest first, optionally narrowed by a username/email search.
pub async fn list_users<C: ConnectionTrait>(
    db: &C,
    search: Option<&str>,
    request: PageRequest,
) -> Result<Page<AdminUser>> {
    let mut select = user::Entity::find().order_by_desc(user::Column::CreatedAt);
    if let Some(search) = search.filter(|s| !s.is_empty()) {
        select = select.filter(
            Condition::any()
                .add(contains_ci(user::Column::Username, search))
                .add(contains_ci(user::Column::Email, search)),
        );
    }

    let page = fetch_page(db, select.into_model::<user::Model>(), request).await?;
    Ok(Page {
        items: page.items.into_iter().map(AdminUser::from).collect(),
        pagination: page.pagination,
    })
}
