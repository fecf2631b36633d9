use sea_orm::sea_query;
use sea_orm_migration::prelude::Iden;

#[derive(Iden, Clone, Copy)]
pub enum Object {
    Table,
    Id,
    Content,
    Name,
    Prefetchable,
    Extent,
}

#[derive(Iden, Clone, Copy)]
pub enum ObjectConnection {
    Table,
    OriginId,
    TargetId,
}

#[derive(Iden, Clone, Copy)]
pub enum Collection {
    Table,
    OwnerId,
    Key,
    Value,
}

/// Columns shared by every index table; the table itself is named at runtime.
#[derive(Iden, Clone, Copy)]
pub enum IndexRow {
    OriginId,
    SearchTerm,
    TargetId,
}
