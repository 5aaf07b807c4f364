use std::collections::{BTreeMap, BTreeSet};

use todosync_core::{BatchRequest, Millis, Todo, TodoId, TodoPatch};

use crate::error::EngineError;
use crate::store::EntityStore;

/// An unsaved edit for one todo. Successive edits fold into the same entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    pub todo_id: TodoId,
    pub fields: TodoPatch,
    pub timestamp: Millis,
}

/// Local intents layered over the [`EntityStore`]: pending edits, pending
/// deletions, and the id snapshots of whichever batches are in flight.
///
/// Invariants kept by every operation:
/// - an id is never both pending deletion and pending change;
/// - the in-flight update snapshot only holds ids whose pending change has not
///   been touched since dispatch.
#[derive(Debug, Default, Clone)]
pub struct PendingOverlay {
    changes: BTreeMap<TodoId, PendingChange>,
    deletions: BTreeSet<TodoId>,
    in_flight_updates: Option<BTreeSet<TodoId>>,
    in_flight_deletes: Option<BTreeSet<TodoId>>,
}

impl PendingOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn change(&self, id: TodoId) -> Option<&PendingChange> {
        self.changes.get(&id)
    }

    pub fn changes(&self) -> impl Iterator<Item = &PendingChange> {
        self.changes.values()
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn is_pending_deletion(&self, id: TodoId) -> bool {
        self.deletions.contains(&id)
    }

    pub fn deletions(&self) -> &BTreeSet<TodoId> {
        &self.deletions
    }

    pub fn has_deletions(&self) -> bool {
        !self.deletions.is_empty()
    }

    pub fn in_flight_updates(&self) -> Option<&BTreeSet<TodoId>> {
        self.in_flight_updates.as_ref()
    }

    pub fn in_flight_deletes(&self) -> Option<&BTreeSet<TodoId>> {
        self.in_flight_deletes.as_ref()
    }

    /// Fold `patch` into the pending change for `id`, stamping it with `now`.
    /// An id edited while part of the in-flight update batch is de-flighted so
    /// the batch's stale result is never applied over this edit.
    pub fn record_edit(
        &mut self,
        id: TodoId,
        patch: TodoPatch,
        now: Millis,
    ) -> Result<&PendingChange, EngineError> {
        if self.deletions.contains(&id) {
            return Err(EngineError::PendingDeletion(id));
        }
        self.deflight(id);
        let entry = self.changes.entry(id).or_insert_with(|| PendingChange {
            todo_id: id,
            fields: TodoPatch::default(),
            timestamp: now,
        });
        entry.fields.merge(patch);
        entry.timestamp = now;
        Ok(entry)
    }

    /// Remove `id` from the store and queue it for deletion. Any pending edit
    /// is discarded and the id leaves the in-flight update snapshot.
    pub fn record_deletion(
        &mut self,
        store: &mut EntityStore,
        id: TodoId,
    ) -> Result<Todo, EngineError> {
        let removed = store.remove_one(id)?;
        self.changes.remove(&id);
        self.deflight(id);
        self.deletions.insert(id);
        Ok(removed)
    }

    /// Ids with a pending change, each paired with the fields to send.
    pub fn snapshot_for_update(&self) -> Vec<(TodoId, TodoPatch)> {
        self.changes
            .values()
            .filter(|change| !change.fields.is_empty())
            .map(|change| (change.todo_id, change.fields.clone()))
            .collect()
    }

    pub fn snapshot_for_delete(&self) -> Vec<TodoId> {
        self.deletions.iter().copied().collect()
    }

    /// Snapshot pending changes into an update request and mark its ids in
    /// flight. `None` when nothing is pending or a batch is already out.
    pub fn begin_update_batch(&mut self) -> Option<BatchRequest> {
        if self.in_flight_updates.is_some() {
            return None;
        }
        let entries = self.snapshot_for_update();
        if entries.is_empty() {
            return None;
        }
        self.in_flight_updates = Some(entries.iter().map(|(id, _)| *id).collect());
        Some(BatchRequest::update(entries))
    }

    pub fn begin_delete_batch(&mut self) -> Option<BatchRequest> {
        if self.in_flight_deletes.is_some() {
            return None;
        }
        let ids = self.snapshot_for_delete();
        if ids.is_empty() {
            return None;
        }
        self.in_flight_deletes = Some(ids.iter().copied().collect());
        Some(BatchRequest::delete(ids))
    }

    /// Clear the in-flight update marker, returning the ids still eligible
    /// for reconciliation.
    pub fn finish_update_batch(&mut self) -> Option<BTreeSet<TodoId>> {
        self.in_flight_updates.take()
    }

    pub fn finish_delete_batch(&mut self) -> Option<BTreeSet<TodoId>> {
        self.in_flight_deletes.take()
    }

    /// Drop the pending change for a todo whose edit the server confirmed.
    pub fn confirm_change(&mut self, id: TodoId) -> Option<PendingChange> {
        self.changes.remove(&id)
    }

    pub fn confirm_deletions<'a>(&mut self, ids: impl IntoIterator<Item = &'a TodoId>) -> usize {
        let mut confirmed = 0;
        for id in ids {
            if self.deletions.remove(id) {
                confirmed += 1;
            }
        }
        confirmed
    }

    fn deflight(&mut self, id: TodoId) {
        if let Some(batch) = self.in_flight_updates.as_mut() {
            batch.remove(&id);
        }
    }
}
