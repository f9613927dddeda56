use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde_json::Value;

use super::{parse_row_limit, seen_window_filters, Datastore};
use crate::entity::images;
use crate::error::ServiceError;

/// Fields written on an image upsert. On conflict with the natural key only
/// `last_seen` advances, so `first_seen` and the manifests of the first
/// observation win.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub top_layer: String,
    pub registry: String,
    pub repo: String,
    pub tag: String,
    pub digest: String,
    pub manifest_v2: Value,
    pub manifest_v1: Value,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Datastore {
    pub async fn get_image(
        &self,
        registry: &str,
        repo: &str,
        tag: &str,
        digest: &str,
    ) -> Result<Option<images::Model>, ServiceError> {
        let image = images::Entity::find()
            .filter(images::Column::Registry.eq(registry))
            .filter(images::Column::Repo.eq(repo))
            .filter(images::Column::Tag.eq(tag))
            .filter(images::Column::Digest.eq(digest))
            .one(&self.db)
            .await?;
        Ok(image)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn get_all_images(
        &self,
        registry: &str,
        repo: &str,
        tag: &str,
        digest: &str,
        date_start: &str,
        date_end: &str,
        limit: &str,
    ) -> Result<Vec<images::Model>, ServiceError> {
        let mut query = images::Entity::find()
            .filter(images::Column::Registry.contains(registry))
            .filter(images::Column::Repo.contains(repo))
            .filter(images::Column::Tag.contains(tag))
            .filter(images::Column::Digest.contains(digest));

        for clause in seen_window_filters(date_start, date_end) {
            query = query.filter(Expr::cust(clause));
        }
        if let Some(limit) = parse_row_limit(limit) {
            query = query.limit(limit);
        }

        Ok(query.all(&self.db).await?)
    }

    pub async fn get_image_by_id(&self, id: i64) -> Result<images::Model, ServiceError> {
        images::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    /// Latest image matching registry/repo/tag. The registry match tolerates
    /// schemeless input by suffix-matching, which can collide when one
    /// registry is a suffix of another; kept as a known limitation.
    pub async fn get_image_by_rrt(
        &self,
        registry: &str,
        repo: &str,
        tag: &str,
    ) -> Result<images::Model, ServiceError> {
        images::Entity::find()
            .filter(images::Column::Registry.ends_with(registry))
            .filter(images::Column::Repo.eq(repo))
            .filter(images::Column::Tag.eq(tag))
            .order_by_desc(images::Column::LastSeen)
            .limit(1)
            .one(&self.db)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    pub async fn get_image_by_digest(&self, digest: &str) -> Result<images::Model, ServiceError> {
        images::Entity::find()
            .filter(images::Column::Digest.eq(digest))
            .order_by_desc(images::Column::LastSeen)
            .limit(1)
            .one(&self.db)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    pub async fn upsert_image(&self, image: &ImageRecord) -> Result<(), ServiceError> {
        let manifest_or_empty = |m: &Value| {
            if m.is_null() {
                Value::Object(serde_json::Map::new())
            } else {
                m.clone()
            }
        };

        let active = images::ActiveModel {
            top_layer: Set(image.top_layer.clone()),
            registry: Set(image.registry.clone()),
            repo: Set(image.repo.clone()),
            tag: Set(image.tag.clone()),
            digest: Set(image.digest.clone()),
            manifest_v2: Set(manifest_or_empty(&image.manifest_v2)),
            manifest_v1: Set(manifest_or_empty(&image.manifest_v1)),
            first_seen: Set(image.first_seen.into()),
            last_seen: Set(image.last_seen.into()),
            ..Default::default()
        };

        images::Entity::insert(active)
            .on_conflict(
                OnConflict::columns([
                    images::Column::Registry,
                    images::Column::Repo,
                    images::Column::Tag,
                    images::Column::Digest,
                ])
                .update_columns([images::Column::LastSeen])
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(())
    }

    pub async fn delete_image(
        &self,
        registry: &str,
        repo: &str,
        tag: &str,
        digest: &str,
    ) -> Result<bool, ServiceError> {
        let res = images::Entity::delete_many()
            .filter(images::Column::Registry.eq(registry))
            .filter(images::Column::Repo.eq(repo))
            .filter(images::Column::Tag.eq(tag))
            .filter(images::Column::Digest.eq(digest))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected > 0)
    }
}
