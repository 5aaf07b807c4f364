use thiserror::Error;

use todosync_core::{BackendError, CoreError};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl From<StorageError> for BackendError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Core(core) => BackendError::from(core),
            other => BackendError::Storage(other.to_string()),
        }
    }
}
