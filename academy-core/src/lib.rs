pub mod models;
pub mod repository;
pub mod identity;
pub mod events;
pub mod registration;
pub mod accounts;

use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// User input rejected; `fields` maps input names to messages
    #[error("Validation failed: {message}")]
    ValidationError {
        message: String,
        fields: BTreeMap<String, String>,
    },
    #[error("Identity verification failed: {0}")]
    IdentityError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl CoreError {
    pub fn field(message: impl Into<String>, field: &str, detail: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), detail.into());
        CoreError::ValidationError {
            message: message.into(),
            fields,
        }
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        CoreError::InternalError(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
