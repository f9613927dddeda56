use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CrawlerPa::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CrawlerPa::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CrawlerPa::Type).string().not_null())
                    .col(ColumnDef::new(CrawlerPa::Status).string().not_null())
                    .col(ColumnDef::new(CrawlerPa::Messages).json_binary().null())
                    .col(
                        ColumnDef::new(CrawlerPa::Started)
                            .timestamp_with_time_zone()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CrawlerPa::Finished)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CrawlerPa::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CrawlerPa {
    Table,
    Id,
    Type,
    Status,
    Messages,
    Started,
    Finished,
}
