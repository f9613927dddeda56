use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use serde_json::Value;

use super::Datastore;
use crate::entity::policies;
use crate::error::ServiceError;

/// Fields written on a policy upsert; keyed by `name`.
#[derive(Debug, Clone)]
pub struct PolicyRecord {
    pub name: String,
    pub allowed_risk_severity: Value,
    pub allowed_cve_names: Value,
    pub allow_not_fixed: bool,
    pub not_allowed_cve_names: Value,
    pub not_allowed_os_names: Value,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Datastore {
    pub async fn get_policy(&self, name: &str) -> Result<Option<policies::Model>, ServiceError> {
        let policy = policies::Entity::find()
            .filter(policies::Column::Name.eq(name))
            .one(&self.db)
            .await?;
        Ok(policy)
    }

    pub async fn get_all_policies(
        &self,
        name: &str,
    ) -> Result<Vec<policies::Model>, ServiceError> {
        let policies = policies::Entity::find()
            .filter(policies::Column::Name.contains(name))
            .all(&self.db)
            .await?;
        Ok(policies)
    }

    pub async fn upsert_policy(&self, policy: &PolicyRecord) -> Result<(), ServiceError> {
        let active = policies::ActiveModel {
            name: Set(policy.name.clone()),
            allowed_risk_severity: Set(policy.allowed_risk_severity.clone()),
            allowed_cve_names: Set(policy.allowed_cve_names.clone()),
            allow_not_fixed: Set(policy.allow_not_fixed),
            not_allowed_cve_names: Set(policy.not_allowed_cve_names.clone()),
            not_allowed_os_names: Set(policy.not_allowed_os_names.clone()),
            created: Set(policy.created.into()),
            updated: Set(policy.updated.into()),
            ..Default::default()
        };

        policies::Entity::insert(active)
            .on_conflict(
                OnConflict::column(policies::Column::Name)
                    .update_columns([
                        policies::Column::AllowedRiskSeverity,
                        policies::Column::AllowedCveNames,
                        policies::Column::AllowNotFixed,
                        policies::Column::NotAllowedCveNames,
                        policies::Column::NotAllowedOsNames,
                        policies::Column::Updated,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(())
    }
}
