use sea_orm_migration::prelude::*;

use crate::db::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Object::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Object::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Object::Content).blob())
                    .col(ColumnDef::new(Object::Name).text())
                    .col(
                        ColumnDef::new(Object::Prefetchable)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("name_object")
                    .table(Object::Table)
                    .col(Object::Name)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("prefetchable_object")
                    .table(Object::Table)
                    .col(Object::Prefetchable)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ObjectConnection::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ObjectConnection::OriginId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ObjectConnection::TargetId)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_object_connection")
                            .col(ObjectConnection::OriginId)
                            .col(ObjectConnection::TargetId),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("target_id_object_connection")
                    .table(ObjectConnection::Table)
                    .col(ObjectConnection::TargetId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Collection::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Collection::OwnerId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Collection::Key).blob().not_null())
                    .col(ColumnDef::new(Collection::Value).blob())
                    .primary_key(
                        Index::create()
                            .name("pk_collection")
                            .col(Collection::OwnerId)
                            .col(Collection::Key),
                    )
                    .to_owned(),
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Collection::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(ObjectConnection::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Object::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}
