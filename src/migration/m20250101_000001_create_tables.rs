use sea_orm::{EntityTrait, Schema};
use sea_orm_migration::prelude::*;

use crate::entity::{connection, server, session, user};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let schema = Schema::new(manager.get_database_backend());

        // Order matters: servers reference users, connections reference both.
        create_table(manager, &schema, user::Entity).await?;
        create_table(manager, &schema, server::Entity).await?;
        create_table(manager, &schema, connection::Entity).await?;
        create_table(manager, &schema, session::Entity).await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_connections_user_server")
                    .table(connection::Entity)
                    .col(connection::Column::UserId)
                    .col(connection::Column::ServerId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_connections_server_status")
                    .table(connection::Entity)
                    .col(connection::Column::ServerId)
                    .col(connection::Column::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_sessions_expiry_date")
                    .table(session::Entity)
                    .col(session::Column::ExpiryDate)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(session::Entity).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(connection::Entity).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(server::Entity).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(user::Entity).if_exists().to_owned())
            .await
    }
}

async fn create_table<E>(manager: &SchemaManager<'_>, schema: &Schema, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait,
{
    manager
        .create_table(schema.create_table_from_entity(entity).if_not_exists().to_owned())
        .await
}
