use thiserror::Error;

use todosync_core::{BackendError, CoreError, TodoId};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("todo not found: {0}")]
    NotFound(TodoId),

    #[error("todo is pending deletion: {0}")]
    PendingDeletion(TodoId),

    #[error("edit for {0} changes no fields")]
    EmptyPatch(TodoId),

    #[error("invalid config: {0}")]
    Config(String),
}

impl EngineError {
    /// True for errors that reject an intent before it reaches the overlay.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Core(CoreError::Validation { .. })
                | Self::Backend(BackendError::Validation { .. })
                | Self::EmptyPatch(_)
        )
    }
}
