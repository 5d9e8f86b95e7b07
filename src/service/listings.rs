//! The server catalog: public browsing and admin maintenance of listings.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Condition, Expr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, Select, Set, TransactionTrait, Unchanged,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{connections, contains_ci, fetch_page, users, Page, PageRequest};
use crate::entity::server::{self, encode_tags, Category, Protocol, ServerStatus, ServerType};
use crate::entity::{connection, user};
use crate::error::{AppError, Result};

/// Narrowing applied to catalog queries. `None` fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    pub server_type: Option<ServerType>,
    pub category: Option<Category>,
    pub status: Option<ServerStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Specs {
    pub cpu: Option<String>,
    pub ram: Option<String>,
    pub storage: Option<String>,
    pub bandwidth: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capacity {
    pub total: i32,
    pub used: i32,
}

/// Public view of a listing. Never includes access credentials.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub server_type: ServerType,
    pub category: Category,
    pub specs: Specs,
    pub location: String,
    pub status: ServerStatus,
    pub price: f64,
    pub currency: String,
    pub availability: i64,
    pub capacity: Capacity,
    pub owner: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ListingSummary {
    pub fn new(server: &server::Model, owner: Option<&user::Model>) -> Self {
        Self {
            id: server.id.clone(),
            name: server.name.clone(),
            description: server.description.clone(),
            server_type: server.server_type,
            category: server.category,
            specs: Specs {
                cpu: server.cpu.clone(),
                ram: server.ram.clone(),
                storage: server.storage.clone(),
                bandwidth: server.bandwidth.clone(),
            },
            location: server.location.clone(),
            status: server.status,
            price: server.price,
            currency: server.currency.clone(),
            availability: server.availability(),
            capacity: Capacity {
                total: server.capacity_total,
                used: server.capacity_used,
            },
            owner: owner.map(|owner| owner.username.clone()),
            tags: server.tag_list(),
            created_at: server.created_at,
        }
    }
}

/// Where to reach a listing, shown to users holding an active connection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub host: Option<String>,
    pub port: Option<i32>,
    pub protocol: Protocol,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingDetail {
    #[serde(flatten)]
    pub summary: ListingSummary,
    pub is_connected: bool,
    pub connection_details: Option<Endpoint>,
}

/// Admin table row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminListing {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub server_type: ServerType,
    pub category: Category,
    pub status: ServerStatus,
    pub price: f64,
    pub capacity: Capacity,
    pub owner: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl AdminListing {
    fn new(server: &server::Model, owner: Option<&user::Model>) -> Self {
        Self {
            id: server.id.clone(),
            name: server.name.clone(),
            description: server.description.clone(),
            server_type: server.server_type,
            category: server.category,
            status: server.status,
            price: server.price,
            capacity: Capacity {
                total: server.capacity_total,
                used: server.capacity_used,
            },
            owner: owner.map(|owner| owner.username.clone()),
            is_public: server.is_public,
            created_at: server.created_at,
            last_updated: server.updated_at,
        }
    }
}

/// Acknowledgement returned by admin writes.
#[derive(Debug, Clone, Serialize)]
pub struct ListingBrief {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub server_type: ServerType,
    pub status: ServerStatus,
    pub owner: Option<String>,
}

impl ListingBrief {
    fn new(server: &server::Model, owner: Option<&user::Model>) -> Self {
        Self {
            id: server.id.clone(),
            name: server.name.clone(),
            server_type: server.server_type,
            status: server.status,
            owner: owner.map(|owner| owner.username.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CapacityInput {
    pub total: i32,
    #[serde(default)]
    pub used: i32,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct CapacityPatch {
    pub total: Option<i32>,
    pub used: Option<i32>,
}

/// Access credentials as admins submit them; absent fields are left untouched on update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessInput {
    pub host: Option<String>,
    pub port: Option<i32>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub protocol: Option<Protocol>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewListing {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub server_type: ServerType,
    pub category: Category,
    #[serde(default)]
    pub specs: Specs,
    pub location: String,
    pub status: Option<ServerStatus>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub capacity: CapacityInput,
    #[serde(default)]
    pub connection_details: AccessInput,
    pub owner_username: String,
    pub is_public: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub server_type: Option<ServerType>,
    pub category: Option<Category>,
    pub specs: Option<Specs>,
    pub location: Option<String>,
    pub status: Option<ServerStatus>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub capacity: Option<CapacityPatch>,
    pub connection_details: Option<AccessInput>,
    pub is_public: Option<bool>,
    pub tags: Option<Vec<String>>,
}

fn validate_capacity(total: i32, used: i32) -> Result<()> {
    if total < 0 || used < 0 || used > total {
        return Err(capacity_error());
    }
    Ok(())
}

fn capacity_error() -> AppError {
    AppError::BadRequest("Capacity must satisfy 0 <= used <= total".into())
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(())
}

fn validate_price(price: f64) -> Result<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::BadRequest("Price must be a non-negative number".into()));
    }
    Ok(())
}

fn filtered(mut select: Select<server::Entity>, filter: &CatalogFilter, match_tags: bool) -> Select<server::Entity> {
    if let Some(server_type) = filter.server_type {
        select = select.filter(server::Column::ServerType.eq(server_type));
    }
    if let Some(category) = filter.category {
        select = select.filter(server::Column::Category.eq(category));
    }
    if let Some(status) = filter.status {
        select = select.filter(server::Column::Status.eq(status));
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        let mut any = Condition::any()
            .add(contains_ci(server::Column::Name, search))
            .add(contains_ci(server::Column::Description, search));
        // Stored tags never contain a comma, so a comma-free needle can only
        // match inside a single tag.
        if match_tags && !search.contains(',') {
            any = any.add(contains_ci(server::Column::Tags, search));
        }
        select = select.filter(any);
    }
    select.order_by_desc(server::Column::CreatedAt)
}

/// Public listings matching `filter`, newest first.
pub async fn list_public<C: ConnectionTrait>(db: &C, filter: &CatalogFilter) -> Result<Vec<ListingSummary>> {
    let select = server::Entity::find().filter(server::Column::IsPublic.eq(true));
    let rows = filtered(select, filter, true)
        .find_also_related(user::Entity)
        .all(db)
        .await?;

    Ok(rows
        .iter()
        .map(|(server, owner)| ListingSummary::new(server, owner.as_ref()))
        .collect())
}

/// A public listing and its owner, or `404 Server not found`.
pub async fn get_public<C: ConnectionTrait>(db: &C, id: &str) -> Result<(server::Model, Option<user::Model>)> {
    server::Entity::find_by_id(id)
        .find_also_related(user::Entity)
        .one(db)
        .await?
        .filter(|(server, _)| server.is_public)
        .ok_or(AppError::NotFound("Server not found"))
}

/// Listing detail as seen by `viewer`, who may be anonymous.
pub async fn detail<C: ConnectionTrait>(db: &C, id: &str, viewer: Option<&str>) -> Result<ListingDetail> {
    let (server, owner) = get_public(db, id).await?;

    let active = match viewer {
        Some(user_id) => connections::active_for(db, user_id, &server.id).await?,
        None => None,
    };

    Ok(ListingDetail {
        summary: ListingSummary::new(&server, owner.as_ref()),
        is_connected: active.is_some(),
        connection_details: active.map(|conn| Endpoint {
            host: server.host.clone(),
            port: server.port,
            protocol: server.protocol,
            connected_at: Some(conn.connected_at),
        }),
    })
}

/// Every listing, public or not, one page at a time.
pub async fn list_admin<C: ConnectionTrait>(
    db: &C,
    filter: &CatalogFilter,
    request: PageRequest,
) -> Result<Page<AdminListing>> {
    let selector = filtered(server::Entity::find(), filter, false)
        .find_also_related(user::Entity)
        .into_model::<server::Model, user::Model>();
    let page = fetch_page(db, selector, request).await?;

    Ok(Page {
        items: page
            .items
            .iter()
            .map(|(server, owner)| AdminListing::new(server, owner.as_ref()))
            .collect(),
        pagination: page.pagination,
    })
}

/// Creates a listing owned by `input.owner_username`, provisioning that account if needed.
pub async fn create(db: &DatabaseConnection, input: NewListing) -> Result<ListingBrief> {
    require("name", &input.name)?;
    require("description", &input.description)?;
    require("location", &input.location)?;
    require("ownerUsername", &input.owner_username)?;
    validate_capacity(input.capacity.total, input.capacity.used)?;
    let price = input.price.unwrap_or(0.0);
    validate_price(price)?;

    let txn = db.begin().await?;
    let owner = users::find_or_provision_owner(&txn, input.owner_username.trim()).await?;

    let now = Utc::now();
    let access = input.connection_details;
    let server = server::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        name: Set(input.name.trim().to_owned()),
        description: Set(input.description),
        server_type: Set(input.server_type),
        category: Set(input.category),
        cpu: Set(input.specs.cpu),
        ram: Set(input.specs.ram),
        storage: Set(input.specs.storage),
        bandwidth: Set(input.specs.bandwidth),
        location: Set(input.location),
        status: Set(input.status.unwrap_or(ServerStatus::Online)),
        price: Set(price),
        currency: Set(input.currency.unwrap_or_else(|| "USD".to_owned())),
        capacity_total: Set(input.capacity.total),
        capacity_used: Set(input.capacity.used),
        host: Set(access.host),
        port: Set(access.port),
        access_username: Set(access.username),
        access_password: Set(access.password),
        protocol: Set(access.protocol.unwrap_or(Protocol::Ssh)),
        owner_id: Set(owner.id.clone()),
        is_public: Set(input.is_public.unwrap_or(true)),
        tags: Set(encode_tags(&input.tags)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    info!(server_id = %server.id, owner = %owner.username, "created listing");
    Ok(ListingBrief::new(&server, Some(&owner)))
}

/// Applies an admin patch. Fields left out of the patch keep their stored value.
///
/// `capacity.used` is only written when the patch names it, so slots claimed or
/// released concurrently are never overwritten by an unrelated edit.
pub async fn update(db: &DatabaseConnection, id: &str, patch: ListingPatch) -> Result<ListingBrief> {
    let txn = db.begin().await?;
    let server = match apply_patch(&txn, id, patch).await {
        Ok(server) => server,
        Err(err) => {
            txn.rollback().await?;
            return Err(err);
        }
    };
    txn.commit().await?;

    let owner = users::find_by_id(db, &server.owner_id).await?;
    info!(server_id = %server.id, "updated listing");
    Ok(ListingBrief::new(&server, owner.as_ref()))
}

async fn apply_patch<C: ConnectionTrait>(db: &C, id: &str, patch: ListingPatch) -> Result<server::Model> {
    if let Some(capacity) = patch.capacity {
        resize(db, id, capacity).await?;
    }

    let mut active = server::ActiveModel {
        id: Unchanged(id.to_owned()),
        ..Default::default()
    };
    if let Some(name) = patch.name {
        require("name", &name)?;
        active.name = Set(name.trim().to_owned());
    }
    if let Some(description) = patch.description {
        require("description", &description)?;
        active.description = Set(description);
    }
    if let Some(location) = patch.location {
        require("location", &location)?;
        active.location = Set(location);
    }
    if let Some(price) = patch.price {
        validate_price(price)?;
        active.price = Set(price);
    }
    if let Some(server_type) = patch.server_type {
        active.server_type = Set(server_type);
    }
    if let Some(category) = patch.category {
        active.category = Set(category);
    }
    if let Some(status) = patch.status {
        active.status = Set(status);
    }
    if let Some(currency) = patch.currency {
        active.currency = Set(currency);
    }
    if let Some(is_public) = patch.is_public {
        active.is_public = Set(is_public);
    }
    if let Some(tags) = patch.tags {
        active.tags = Set(encode_tags(&tags));
    }
    if let Some(specs) = patch.specs {
        if specs.cpu.is_some() {
            active.cpu = Set(specs.cpu);
        }
        if specs.ram.is_some() {
            active.ram = Set(specs.ram);
        }
        if specs.storage.is_some() {
            active.storage = Set(specs.storage);
        }
        if specs.bandwidth.is_some() {
            active.bandwidth = Set(specs.bandwidth);
        }
    }
    if let Some(access) = patch.connection_details {
        if access.host.is_some() {
            active.host = Set(access.host);
        }
        if access.port.is_some() {
            active.port = Set(access.port);
        }
        if access.username.is_some() {
            active.access_username = Set(access.username);
        }
        if access.password.is_some() {
            active.access_password = Set(access.password);
        }
        if let Some(protocol) = access.protocol {
            active.protocol = Set(protocol);
        }
    }

    active.update(db).await.map_err(|err| match err {
        DbErr::RecordNotUpdated => AppError::NotFound("Server not found"),
        err => err.into(),
    })
}

/// Writes new capacity counters, guarded in SQL so `0 <= used <= total` holds
/// against whatever value `capacity_used` has at the time of the write.
async fn resize<C: ConnectionTrait>(db: &C, id: &str, capacity: CapacityPatch) -> Result<()> {
    let mut resize = server::Entity::update_many().filter(server::Column::Id.eq(id));
    match (capacity.total, capacity.used) {
        (None, None) => return Ok(()),
        (Some(total), Some(used)) => {
            validate_capacity(total, used)?;
            resize = resize
                .col_expr(server::Column::CapacityTotal, Expr::value(total))
                .col_expr(server::Column::CapacityUsed, Expr::value(used));
        }
        (Some(total), None) => {
            validate_capacity(total, 0)?;
            resize = resize
                .col_expr(server::Column::CapacityTotal, Expr::value(total))
                .filter(server::Column::CapacityUsed.lte(total));
        }
        (None, Some(used)) => {
            validate_capacity(used, used)?;
            resize = resize
                .col_expr(server::Column::CapacityUsed, Expr::value(used))
                .filter(server::Column::CapacityTotal.gte(used));
        }
    }

    if resize.exec(db).await?.rows_affected == 0 {
        return match server::Entity::find_by_id(id).one(db).await? {
            Some(_) => Err(capacity_error()),
            None => Err(AppError::NotFound("Server not found")),
        };
    }
    Ok(())
}

/// Deletes a listing together with every connection to it.
pub async fn delete(db: &DatabaseConnection, id: &str) -> Result<()> {
    let txn = db.begin().await?;

    let released = connection::Entity::delete_many()
        .filter(connection::Column::ServerId.eq(id))
        .exec(&txn)
        .await?;
    let deleted = server::Entity::delete_by_id(id).exec(&txn).await?;
    if deleted.rows_affected == 0 {
        return Err(AppError::NotFound("Server not found"));
    }

    txn.commit().await?;
    info!(server_id = %id, connections = released.rows_affected, "deleted listing");
    Ok(())
}

/// Flips a listing between online and offline and returns the new status.
pub async fn toggle_status<C: ConnectionTrait>(db: &C, id: &str) -> Result<ServerStatus> {
    let server = server::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("Server not found"))?;

    let status = server.status.toggled();
    let mut active = server.into_active_model();
    active.status = Set(status);
    active.update(db).await?;

    info!(server_id = %id, ?status, "toggled listing status");
    Ok(status)
}
