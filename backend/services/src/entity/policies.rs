use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A vulnerability policy keyed by name. The list columns hold JSON arrays of
/// strings.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "policy_pa")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,
    #[sea_orm(column_type = "Json")]
    pub allowed_risk_severity: Json,
    #[sea_orm(column_type = "Json")]
    pub allowed_cve_names: Json,
    pub allow_not_fixed: bool,
    #[sea_orm(column_type = "Json")]
    pub not_allowed_cve_names: Json,
    #[sea_orm(column_type = "Json")]
    pub not_allowed_os_names: Json,
    pub created: DateTimeWithTimeZone,
    pub updated: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

fn string_list(value: &Json) -> Vec<String> {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

impl From<Model> for portauthority_shared::Policy {
    fn from(model: Model) -> Self {
        portauthority_shared::Policy {
            id: Some(model.id),
            name: model.name,
            allowed_risk_severity: string_list(&model.allowed_risk_severity),
            allowed_cve_names: string_list(&model.allowed_cve_names),
            allow_not_fixed: model.allow_not_fixed,
            not_allowed_cve_names: string_list(&model.not_allowed_cve_names),
            not_allowed_os_names: string_list(&model.not_allowed_os_names),
            created: Some(model.created.with_timezone(&chrono::Utc)),
            updated: Some(model.updated.with_timezone(&chrono::Utc)),
        }
    }
}
