use sea_orm_migration::prelude::*;

pub use sea_orm_migration::MigratorTrait;

pub mod m20250301_000001_create_images;
pub mod m20250301_000002_create_containers;
pub mod m20250301_000003_create_policies;
pub mod m20250301_000004_create_crawlers;
pub mod m20250301_000005_seed_default_policy;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_images::Migration),
            Box::new(m20250301_000002_create_containers::Migration),
            Box::new(m20250301_000003_create_policies::Migration),
            Box::new(m20250301_000004_create_crawlers::Migration),
            Box::new(m20250301_000005_seed_default_policy::Migration),
        ]
    }
}
