use serde::{Deserialize, Serialize};

use crate::ids::TodoId;
use crate::query::{ListQuery, TodoPage};
use crate::todo::{NewTodo, Todo, TodoPatch};
use crate::{BackendError, CoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchAction {
    Complete,
    Delete,
    Update,
}

impl BatchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Delete => "delete",
            Self::Update => "update",
        }
    }
}

/// A single `batch_update` call. For [`BatchAction::Update`], `data[i]` is the
/// patch for `ids[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub ids: Vec<TodoId>,
    pub action: BatchAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<TodoPatch>>,
}

impl BatchRequest {
    pub fn update(entries: Vec<(TodoId, TodoPatch)>) -> Self {
        let (ids, data) = entries.into_iter().unzip();
        Self {
            ids,
            action: BatchAction::Update,
            data: Some(data),
        }
    }

    pub fn delete(ids: Vec<TodoId>) -> Self {
        Self {
            ids,
            action: BatchAction::Delete,
            data: None,
        }
    }

    pub fn complete(ids: Vec<TodoId>) -> Self {
        Self {
            ids,
            action: BatchAction::Complete,
            data: None,
        }
    }

    /// Pairs each id with its patch. Fails when `data` is missing or not
    /// aligned with `ids`.
    pub fn entries(&self) -> Result<Vec<(TodoId, &TodoPatch)>, CoreError> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| CoreError::validation("data", "update batch requires data"))?;
        if data.len() != self.ids.len() {
            return Err(CoreError::validation(
                "data",
                format!("{} patches for {} ids", data.len(), self.ids.len()),
            ));
        }
        Ok(self.ids.iter().copied().zip(data.iter()).collect())
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec_named(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub success: bool,
    pub updated: Vec<Todo>,
}

impl BatchResponse {
    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec_named(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
}

/// The server-side collaborator. Implementations own durable todo state and
/// enforce the same validation rules as the client.
pub trait TodoBackend {
    fn list_todos(&mut self, query: &ListQuery) -> Result<TodoPage, BackendError>;

    fn create_todo(&mut self, new: &NewTodo) -> Result<Todo, BackendError>;

    fn update_todo(&mut self, id: TodoId, patch: &TodoPatch) -> Result<Todo, BackendError>;

    fn delete_todo(&mut self, id: TodoId) -> Result<DeleteResponse, BackendError>;

    fn batch_update(&mut self, request: &BatchRequest) -> Result<BatchResponse, BackendError>;
}

impl<B: TodoBackend + ?Sized> TodoBackend for &mut B {
    fn list_todos(&mut self, query: &ListQuery) -> Result<TodoPage, BackendError> {
        (**self).list_todos(query)
    }

    fn create_todo(&mut self, new: &NewTodo) -> Result<Todo, BackendError> {
        (**self).create_todo(new)
    }

    fn update_todo(&mut self, id: TodoId, patch: &TodoPatch) -> Result<Todo, BackendError> {
        (**self).update_todo(id, patch)
    }

    fn delete_todo(&mut self, id: TodoId) -> Result<DeleteResponse, BackendError> {
        (**self).delete_todo(id)
    }

    fn batch_update(&mut self, request: &BatchRequest) -> Result<BatchResponse, BackendError> {
        (**self).batch_update(request)
    }
}
