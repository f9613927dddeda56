use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ImagePa::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ImagePa::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ImagePa::TopLayer)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(ImagePa::Registry).string().not_null())
                    .col(ColumnDef::new(ImagePa::Repo).string().not_null())
                    .col(ColumnDef::new(ImagePa::Tag).string().not_null())
                    .col(ColumnDef::new(ImagePa::Digest).string().not_null())
                    .col(
                        ColumnDef::new(ImagePa::ManifestV2)
                            .json_binary()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(ImagePa::ManifestV1)
                            .json_binary()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(ImagePa::FirstSeen)
                            .timestamp_with_time_zone()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ImagePa::LastSeen)
                            .timestamp_with_time_zone()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Upserts key on the full image coordinates
        manager
            .create_index(
                Index::create()
                    .name("idx_image_pa_natural_key")
                    .table(ImagePa::Table)
                    .col(ImagePa::Registry)
                    .col(ImagePa::Repo)
                    .col(ImagePa::Tag)
                    .col(ImagePa::Digest)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_image_pa_top_layer")
                    .table(ImagePa::Table)
                    .col(ImagePa::TopLayer)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_image_pa_last_seen")
                    .table(ImagePa::Table)
                    .col(ImagePa::LastSeen)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ImagePa::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ImagePa {
    Table,
    Id,
    TopLayer,
    Registry,
    Repo,
    Tag,
    Digest,
    ManifestV2,
    ManifestV1,
    FirstSeen,
    LastSeen,
}
