use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ContainerPa::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ContainerPa::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ContainerPa::Namespace).string().not_null())
                    .col(ColumnDef::new(ContainerPa::Cluster).string().not_null())
                    .col(ColumnDef::new(ContainerPa::Name).string().not_null())
                    .col(ColumnDef::new(ContainerPa::Image).string().not_null())
                    .col(ColumnDef::new(ContainerPa::ImageId).string().not_null())
                    .col(
                        ColumnDef::new(ContainerPa::ImageRegistry)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(ContainerPa::ImageRepo)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(ContainerPa::ImageTag)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(ContainerPa::ImageDigest)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(ContainerPa::Annotations)
                            .json_binary()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(ContainerPa::FirstSeen)
                            .timestamp_with_time_zone()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ContainerPa::LastSeen)
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
                    .name("idx_container_pa_natural_key")
                    .table(ContainerPa::Table)
                    .col(ContainerPa::Namespace)
                    .col(ContainerPa::Cluster)
                    .col(ContainerPa::Name)
                    .col(ContainerPa::Image)
                    .col(ContainerPa::ImageId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_container_pa_image_registry")
                    .table(ContainerPa::Table)
                    .col(ContainerPa::ImageRegistry)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_container_pa_image_digest")
                    .table(ContainerPa::Table)
                    .col(ContainerPa::ImageDigest)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ContainerPa::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ContainerPa {
    Table,
    Id,
    Namespace,
    Cluster,
    Name,
    Image,
    ImageId,
    ImageRegistry,
    ImageRepo,
    ImageTag,
    ImageDigest,
    Annotations,
    FirstSeen,
    LastSeen,
}
