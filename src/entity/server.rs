//! Hosted server listings.
//!
//! A listing carries two capacity counters, `capacity_total` and
//! `capacity_used`. Connections claim and release slots through the
//! bookkeeping in [`crate::service::connections`]; nothing else writes
//! `capacity_used` except admin edits, which are validated against
//! `0 <= used <= total` before they reach the database.

use async_trait::async_trait;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

/// Whether a listing is offered for free or for a price.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    #[sea_orm(string_value = "free")]
    Free,
    #[sea_orm(string_value = "paid")]
    Paid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[sea_orm(string_value = "gaming")]
    Gaming,
    #[sea_orm(string_value = "web")]
    Web,
    #[sea_orm(string_value = "bot")]
    Bot,
    #[sea_orm(string_value = "database")]
    Database,
    #[sea_orm(string_value = "storage")]
    Storage,
    #[sea_orm(string_value = "compute")]
    Compute,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    #[sea_orm(string_value = "online")]
    Online,
    #[sea_orm(string_value = "offline")]
    Offline,
    #[sea_orm(string_value = "maintenance")]
    Maintenance,
}

impl ServerStatus {
    /// Status an admin toggle moves to: `online` goes offline, anything else comes online.
    pub fn toggled(self) -> Self {
        match self {
            Self::Online => Self::Offline,
            Self::Offline | Self::Maintenance => Self::Online,
        }
    }
}

/// Protocol users speak to reach the hosted machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[sea_orm(string_value = "ssh")]
    Ssh,
    #[sea_orm(string_value = "ftp")]
    Ftp,
    #[sea_orm(string_value = "http")]
    Http,
    #[sea_orm(string_value = "https")]
    Https,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "servers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub server_type: ServerType,
    pub category: Category,
    pub cpu: Option<String>,
    pub ram: Option<String>,
    pub storage: Option<String>,
    pub bandwidth: Option<String>,
    pub location: String,
    pub status: ServerStatus,
    pub price: f64,
    pub currency: String,
    pub capacity_total: i32,
    pub capacity_used: i32,
    pub host: Option<String>,
    pub port: Option<i32>,
    /// Login handed out to connected users, together with `access_password`.
    pub access_username: Option<String>,
    pub access_password: Option<String>,
    pub protocol: Protocol,
    pub owner_id: String,
    pub is_public: bool,
    /// Comma separated, see [`encode_tags`].
    #[sea_orm(column_type = "Text")]
    pub tags: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Share of capacity still free, as a rounded percentage.
    pub fn availability(&self) -> i64 {
        if self.capacity_total == 0 {
            return 0;
        }
        let free = 1.0 - f64::from(self.capacity_used) / f64::from(self.capacity_total);
        (free * 100.0).round() as i64
    }

    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .split(',')
            .filter(|tag| !tag.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

/// Normalizes tags into the stored form: trimmed, non-empty, unique, comma free.
pub fn encode_tags<I, S>(tags: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().replace(',', " ").trim().to_owned();
        if !tag.is_empty() && !seen.contains(&tag) {
            seen.push(tag);
        }
    }
    seen.join(",")
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::OwnerId",
        to = "super::user::Column::Id"
    )]
    Owner,
    #[sea_orm(has_many = "super::connection::Entity")]
    Connections,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl Related<super::connection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Connections.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        self.updated_at = Set(chrono::Utc::now());
        Ok(self)
    }
}
