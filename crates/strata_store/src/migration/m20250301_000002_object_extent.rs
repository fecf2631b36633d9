use sea_orm_migration::prelude::*;

use crate::db::Object;

/// Databases created before type-scoped enumeration lack `object.extent`.
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if !manager.has_column("object", "extent").await? {
            manager
                .alter_table(
                    Table::alter()
                        .table(Object::Table)
                        .add_column(ColumnDef::new(Object::Extent).text())
                        .to_owned(),
                )
                .await?;
        }
        manager
            .create_index(
                Index::create()
                    .name("extent_object")
                    .table(Object::Table)
                    .col(Object::Extent)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("extent_object")
                    .table(Object::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .alter_table(
                Table::alter()
                    .table(Object::Table)
                    .drop_column(Object::Extent)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}
