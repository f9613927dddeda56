use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Admission falls back to the "default" policy, so one must exist.
        manager
            .get_connection()
            .execute_unprepared(
                "INSERT INTO policy_pa (name, allow_not_fixed, created, updated) \
                 VALUES ('default', false, now(), now()) \
                 ON CONFLICT (name) DO NOTHING",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DELETE FROM policy_pa WHERE name = 'default'")
            .await?;

        Ok(())
    }
}
