use thiserror::Error;

/// Error taxonomy shared by the datastore, the registry and Analyzer clients,
/// and the crawlers. The server maps these onto HTTP statuses; crawlers fold
/// them into their status messages.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("the resource cannot be found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("unexpected status code: {0}")]
    StatusCode(u16),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound)
    }
}

impl From<sea_orm::DbErr> for ServiceError {
    fn from(err: sea_orm::DbErr) -> Self {
        ServiceError::Internal(err.into())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Internal(err.into())
    }
}
