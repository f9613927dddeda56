use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A pod-container observation. (namespace, cluster, name, image, image_id)
/// is the natural key; annotations are replaced wholesale on update.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "container_pa")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub namespace: String,
    pub cluster: String,
    pub name: String,
    pub image: String,
    pub image_id: String,
    pub image_registry: String,
    pub image_repo: String,
    pub image_tag: String,
    pub image_digest: String,
    #[sea_orm(column_type = "Json")]
    pub annotations: Json,
    pub first_seen: DateTimeWithTimeZone,
    pub last_seen: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for portauthority_shared::Container {
    fn from(model: Model) -> Self {
        portauthority_shared::Container {
            id: Some(model.id),
            namespace: model.namespace,
            cluster: model.cluster,
            name: model.name,
            image: model.image,
            image_id: model.image_id,
            image_registry: model.image_registry,
            image_repo: model.image_repo,
            image_tag: model.image_tag,
            image_digest: model.image_digest,
            annotations: Some(model.annotations),
            first_seen: Some(model.first_seen.with_timezone(&chrono::Utc)),
            last_seen: Some(model.last_seen.with_timezone(&chrono::Utc)),
            ..Default::default()
        }
    }
}
