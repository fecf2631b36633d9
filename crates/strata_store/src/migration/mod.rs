use sea_orm_migration::prelude::*;

mod m20250101_000001_object_tables;
mod m20250301_000002_object_extent;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_object_tables::Migration),
            Box::new(m20250301_000002_object_extent::Migration),
        ]
    }
}
