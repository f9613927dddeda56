use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde_json::Value;

use super::{parse_row_limit, seen_window_filters, Datastore};
use crate::entity::containers;
use crate::error::ServiceError;

/// Fields written on a container upsert. On conflict with the natural key the
/// annotations are replaced and `last_seen` advances.
#[derive(Debug, Clone)]
pub struct ContainerRecord {
    pub namespace: String,
    pub cluster: String,
    pub name: String,
    pub image: String,
    pub image_id: String,
    pub image_registry: String,
    pub image_repo: String,
    pub image_tag: String,
    pub image_digest: String,
    pub annotations: Value,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Datastore {
    pub async fn get_container(
        &self,
        namespace: &str,
        cluster: &str,
        name: &str,
        image: &str,
        image_id: &str,
    ) -> Result<Option<containers::Model>, ServiceError> {
        let container = containers::Entity::find()
            .filter(containers::Column::Namespace.eq(namespace))
            .filter(containers::Column::Cluster.eq(cluster))
            .filter(containers::Column::Name.eq(name))
            .filter(containers::Column::Image.eq(image))
            .filter(containers::Column::ImageId.eq(image_id))
            .one(&self.db)
            .await?;
        Ok(container)
    }

    pub async fn get_container_by_id(&self, id: i64) -> Result<containers::Model, ServiceError> {
        containers::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn get_all_containers(
        &self,
        namespace: &str,
        cluster: &str,
        name: &str,
        image: &str,
        image_id: &str,
        date_start: &str,
        date_end: &str,
        limit: &str,
    ) -> Result<Vec<containers::Model>, ServiceError> {
        let mut query = containers::Entity::find()
            .filter(containers::Column::Namespace.contains(namespace))
            .filter(containers::Column::Cluster.contains(cluster))
            .filter(containers::Column::Name.contains(name))
            .filter(containers::Column::Image.contains(image))
            .filter(containers::Column::ImageId.contains(image_id))
            .order_by_desc(containers::Column::LastSeen);

        for clause in seen_window_filters(date_start, date_end) {
            query = query.filter(Expr::cust(clause));
        }
        if let Some(limit) = parse_row_limit(limit) {
            query = query.limit(limit);
        }

        Ok(query.all(&self.db).await?)
    }

    pub async fn upsert_container(&self, container: &ContainerRecord) -> Result<(), ServiceError> {
        let active = containers::ActiveModel {
            namespace: Set(container.namespace.clone()),
            cluster: Set(container.cluster.clone()),
            name: Set(container.name.clone()),
            image: Set(container.image.clone()),
            image_id: Set(container.image_id.clone()),
            image_registry: Set(container.image_registry.clone()),
            image_repo: Set(container.image_repo.clone()),
            image_tag: Set(container.image_tag.clone()),
            image_digest: Set(container.image_digest.clone()),
            annotations: Set(container.annotations.clone()),
            first_seen: Set(container.first_seen.into()),
            last_seen: Set(container.last_seen.into()),
            ..Default::default()
        };

        containers::Entity::insert(active)
            .on_conflict(
                OnConflict::columns([
                    containers::Column::Namespace,
                    containers::Column::Cluster,
                    containers::Column::Name,
                    containers::Column::Image,
                    containers::Column::ImageId,
                ])
                .update_columns([
                    containers::Column::Annotations,
                    containers::Column::LastSeen,
                ])
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(())
    }
}
