use std::collections::HashMap;

use todosync_core::{Todo, TodoId, TodoPatch};

use crate::error::EngineError;

/// Normalized todos keyed by id, iterated in insertion order. Holds the last
/// state the server is known to have.
#[derive(Debug, Default, Clone)]
pub struct EntityStore {
    order: Vec<TodoId>,
    records: HashMap<TodoId, Todo>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: TodoId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn get(&self, id: TodoId) -> Option<&Todo> {
        self.records.get(&id)
    }

    pub fn ids(&self) -> &[TodoId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &Todo> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    /// Replace the whole collection. Later duplicates of an id overwrite earlier ones
    /// but keep the first position.
    pub fn set_all(&mut self, records: impl IntoIterator<Item = Todo>) {
        self.order.clear();
        self.records.clear();
        for record in records {
            self.add_one(record);
        }
    }

    /// Insert a record. An existing id keeps its position and takes the new value.
    pub fn add_one(&mut self, record: Todo) {
        let id = record.id;
        if self.records.insert(id, record).is_none() {
            self.order.push(id);
        }
    }

    pub fn remove_one(&mut self, id: TodoId) -> Result<Todo, EngineError> {
        let record = self.records.remove(&id).ok_or(EngineError::NotFound(id))?;
        self.order.retain(|existing| *existing != id);
        Ok(record)
    }

    pub fn update_one(&mut self, id: TodoId, patch: &TodoPatch) -> Result<&Todo, EngineError> {
        let record = self.records.get_mut(&id).ok_or(EngineError::NotFound(id))?;
        patch.apply_to(record);
        Ok(record)
    }

    /// Overwrite an existing record wholesale with a server copy.
    pub fn replace_one(&mut self, record: Todo) -> Result<(), EngineError> {
        let slot = self
            .records
            .get_mut(&record.id)
            .ok_or(EngineError::NotFound(record.id))?;
        *slot = record;
        Ok(())
    }
}
