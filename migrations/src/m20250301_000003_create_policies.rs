use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PolicyPa::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PolicyPa::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PolicyPa::Name).string().not_null())
                    .col(
                        ColumnDef::new(PolicyPa::AllowedRiskSeverity)
                            .json_binary()
                            .not_null()
                            .default("[]"),
                    )
                    .col(
                        ColumnDef::new(PolicyPa::AllowedCveNames)
                            .json_binary()
                            .not_null()
                            .default("[]"),
                    )
                    .col(
                        ColumnDef::new(PolicyPa::AllowNotFixed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PolicyPa::NotAllowedCveNames)
                            .json_binary()
                            .not_null()
                            .default("[]"),
                    )
                    .col(
                        ColumnDef::new(PolicyPa::NotAllowedOsNames)
                            .json_binary()
                            .not_null()
                            .default("[]"),
                    )
                    .col(
                        ColumnDef::new(PolicyPa::Created)
                            .timestamp_with_time_zone()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PolicyPa::Updated)
                            .timestamp_with_time_zone()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_policy_pa_name")
                    .table(PolicyPa::Table)
                    .col(PolicyPa::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PolicyPa::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PolicyPa {
    Table,
    Id,
    Name,
    AllowedRiskSeverity,
    AllowedCveNames,
    AllowNotFixed,
    NotAllowedCveNames,
    NotAllowedOsNames,
    Created,
    Updated,
}
