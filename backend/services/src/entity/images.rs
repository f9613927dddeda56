use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// An image observation. (registry, repo, tag, digest) is the natural key;
/// `top_layer` is the Analyzer-facing identifier of the topmost layer.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "image_pa")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub top_layer: String,
    pub registry: String,
    pub repo: String,
    pub tag: String,
    pub digest: String,
    #[sea_orm(column_type = "Json")]
    pub manifest_v2: Json,
    #[sea_orm(column_type = "Json")]
    pub manifest_v1: Json,
    pub first_seen: DateTimeWithTimeZone,
    pub last_seen: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for portauthority_shared::Image {
    fn from(model: Model) -> Self {
        portauthority_shared::Image {
            id: Some(model.id),
            top_layer: None,
            registry: model.registry,
            repo: model.repo,
            tag: model.tag,
            digest: model.digest,
            first_seen: Some(model.first_seen.with_timezone(&chrono::Utc)),
            last_seen: Some(model.last_seen.with_timezone(&chrono::Utc)),
            ..Default::default()
        }
    }
}
