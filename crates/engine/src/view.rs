use serde::{Deserialize, Serialize};

use todosync_core::{Todo, TodoId};

use crate::overlay::PendingOverlay;
use crate::store::EntityStore;

/// What the presentation layer renders for one todo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoView {
    #[serde(flatten)]
    pub todo: Todo,
    pub is_pending: bool,
}

/// Stored record with any pending edit laid over it.
pub fn effective_view(store: &EntityStore, overlay: &PendingOverlay, id: TodoId) -> Option<TodoView> {
    let stored = store.get(id)?;
    Some(match overlay.change(id) {
        Some(change) => {
            let mut todo = stored.clone();
            change.fields.apply_to(&mut todo);
            TodoView {
                todo,
                is_pending: true,
            }
        }
        None => TodoView {
            todo: stored.clone(),
            is_pending: false,
        },
    })
}

/// Every stored todo in store order, with pending edits applied.
pub fn effective_views(store: &EntityStore, overlay: &PendingOverlay) -> Vec<TodoView> {
    store
        .ids()
        .iter()
        .filter_map(|id| effective_view(store, overlay, *id))
        .collect()
}
