use chrono::{DateTime, Utc};
use portauthority_shared::CrawlerMessages;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait};

use super::Datastore;
use crate::entity::crawlers;
use crate::error::ServiceError;

impl Datastore {
    pub async fn get_crawler(&self, id: i64) -> Result<crawlers::Model, ServiceError> {
        crawlers::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    /// Inserts a new crawl run and returns its id.
    pub async fn insert_crawler(
        &self,
        crawler_type: &str,
        status: &str,
        started: DateTime<Utc>,
    ) -> Result<i64, ServiceError> {
        let active = crawlers::ActiveModel {
            crawler_type: Set(crawler_type.to_string()),
            status: Set(status.to_string()),
            started: Set(started.into()),
            ..Default::default()
        };
        let res = crawlers::Entity::insert(active).exec(&self.db).await?;
        Ok(res.last_insert_id)
    }

    /// Advances a crawl run. Status is always written; messages and finished
    /// only when provided, so earlier values survive intermediate updates.
    pub async fn update_crawler(
        &self,
        id: i64,
        status: &str,
        messages: Option<&CrawlerMessages>,
        finished: Option<DateTime<Utc>>,
    ) -> Result<(), ServiceError> {
        let mut active = crawlers::ActiveModel {
            id: Set(id),
            status: Set(status.to_string()),
            ..Default::default()
        };
        if let Some(messages) = messages {
            active.messages = Set(Some(serde_json::to_value(messages)?));
        }
        if let Some(finished) = finished {
            active.finished = Set(Some(finished.into()));
        }
        active.update(&self.db).await?;
        Ok(())
    }
}
