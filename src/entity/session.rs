//! Rows behind [`crate::SeaOrmStore`].

use sea_orm::entity::prelude::*;

/// One `tower-sessions` record.
///
/// `data` holds the whole MessagePack-encoded `Record`; `id` and
/// `expiry_date` are copied out of it so lookups and cleanup stay in SQL.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    pub data: Vec<u8>,
    /// Indexed, see the migration.
    pub expiry_date: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
