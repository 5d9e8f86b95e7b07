//! Accounts: registration, login and owner provisioning.

use chrono::Utc;
use sea_orm::sea_query::Condition;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter, Set, SqlErr,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::password;
use crate::entity::user::{self, Role};
use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// What clients get to see of an account.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl From<&user::Model> for UserView {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// Creates an account with a hashed password.
///
/// Username and email must both be unused.
pub async fn register<C: ConnectionTrait>(db: &C, registration: Registration) -> Result<user::Model> {
    let Registration {
        username,
        email,
        password,
    } = registration;
    if username.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
        return Err(AppError::BadRequest("All fields are required".into()));
    }

    let existing = user::Entity::find()
        .filter(
            Condition::any()
                .add(user::Column::Username.eq(username.as_str()))
                .add(user::Column::Email.eq(email.as_str())),
        )
        .one(db)
        .await?;
    if existing.is_some() {
        return Err(AppError::UserExists);
    }

    let password_hash = password::hash(password).await?;
    let created = insert_user(db, username, email, password_hash).await?;
    info!(user_id = %created.id, username = %created.username, "registered user");
    Ok(created)
}

/// Checks a username-or-email and password pair and records the login.
pub async fn authenticate<C: ConnectionTrait>(db: &C, login: &str, password: &str) -> Result<user::Model> {
    let invalid = || AppError::Unauthorized("Invalid credentials");

    let user = user::Entity::find()
        .filter(
            Condition::any()
                .add(user::Column::Username.eq(login))
                .add(user::Column::Email.eq(login)),
        )
        .one(db)
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(invalid)?;

    if !password::verify(password.to_owned(), user.password_hash.clone()).await? {
        return Err(invalid());
    }

    let mut active = user.into_active_model();
    active.last_login = Set(Some(Utc::now()));
    Ok(active.update(db).await?)
}

/// Looks up an account by id.
pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: &str) -> Result<Option<user::Model>> {
    Ok(user::Entity::find_by_id(id).one(db).await?)
}

/// Looks up a listing owner by username, creating a placeholder account if needed.
///
/// The placeholder gets a random password nobody knows, so it cannot be logged
/// into until someone resets it.
pub async fn find_or_provision_owner<C: ConnectionTrait>(db: &C, username: &str) -> Result<user::Model> {
    if let Some(owner) = user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await?
    {
        return Ok(owner);
    }

    let password_hash = password::hash(Uuid::new_v4().to_string()).await?;
    let owner = insert_user(
        db,
        username.to_owned(),
        format!("{username}@example.com"),
        password_hash,
    )
    .await?;
    info!(user_id = %owner.id, username = %owner.username, "provisioned placeholder owner");
    Ok(owner)
}

async fn insert_user<C: ConnectionTrait>(
    db: &C,
    username: String,
    email: String,
    password_hash: String,
) -> Result<user::Model> {
    user::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        username: Set(username),
        email: Set(email),
        password_hash: Set(password_hash),
        role: Set(Role::User),
        is_active: Set(true),
        last_login: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .map_err(|err| match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::UserExists,
        _ => err.into(),
    })
}
