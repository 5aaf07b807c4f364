use thiserror::Error;

use crate::ids::TodoId;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl CoreError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

/// Failure taxonomy of the backend contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("todo not found: {0}")]
    NotFound(TodoId),

    #[error("network error: {0}")]
    Network(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<CoreError> for BackendError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation { field, message } => Self::Validation { field, message },
            other => Self::Storage(other.to_string()),
        }
    }
}
