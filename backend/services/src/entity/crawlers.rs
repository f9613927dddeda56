use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A crawl run. Status advances monotonically to `finished` or `error`; rows
/// are never deleted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "crawler_pa")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(column_name = "type")]
    pub crawler_type: String,
    pub status: String,
    #[sea_orm(column_type = "Json", nullable)]
    pub messages: Option<Json>,
    pub started: DateTimeWithTimeZone,
    pub finished: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for portauthority_shared::Crawler {
    fn from(model: Model) -> Self {
        let messages = model
            .messages
            .and_then(|m| serde_json::from_value(m).ok());
        portauthority_shared::Crawler {
            id: Some(model.id),
            crawler_type: model.crawler_type,
            status: model.status,
            messages,
            started: Some(model.started.with_timezone(&chrono::Utc)),
            finished: model.finished.map(|f| f.with_timezone(&chrono::Utc)),
            ..Default::default()
        }
    }
}
