use std::collections::BTreeSet;

use tracing::{debug, warn};

use todosync_core::{BackendError, BatchResponse, TodoId};

use crate::overlay::PendingOverlay;
use crate::store::EntityStore;

/// Per-record result of merging an update batch response.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Server records written to the store; their pending changes are gone.
    pub applied: Vec<TodoId>,
    /// Server records ignored because they were de-flighted or already confirmed.
    pub skipped: Vec<TodoId>,
    /// Ids sent in the batch that the server did not return. Their pending
    /// changes stay queued.
    pub missing: Vec<TodoId>,
}

/// What a completed batch did to local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Updated(UpdateOutcome),
    /// Ids whose deletion the server confirmed.
    Deleted(Vec<TodoId>),
}

/// A reply the server flagged as unsuccessful counts as a batch failure.
fn accepted(result: Result<BatchResponse, BackendError>) -> Result<BatchResponse, BackendError> {
    let response = result?;
    if !response.success {
        return Err(BackendError::Storage("server reported batch failure".into()));
    }
    Ok(response)
}

/// Merge an update batch result. The in-flight marker is cleared whatever the
/// outcome; on failure every pending change stays queued.
pub fn reconcile_update(
    store: &mut EntityStore,
    overlay: &mut PendingOverlay,
    result: Result<BatchResponse, BackendError>,
) -> Result<UpdateOutcome, BackendError> {
    let snapshot = overlay.finish_update_batch();
    let response = accepted(result)?;
    let Some(snapshot) = snapshot else {
        warn!(records = response.updated.len(), "update response with no batch in flight");
        return Ok(UpdateOutcome {
            skipped: response.updated.iter().map(|todo| todo.id).collect(),
            ..UpdateOutcome::default()
        });
    };

    let mut outcome = UpdateOutcome::default();
    let returned: BTreeSet<TodoId> = response.updated.iter().map(|todo| todo.id).collect();
    outcome.missing = snapshot
        .iter()
        .filter(|id| !returned.contains(id))
        .copied()
        .collect();
    for server in response.updated {
        let id = server.id;
        if !snapshot.contains(&id) || overlay.change(id).is_none() {
            debug!(%id, "skipping superseded server record");
            outcome.skipped.push(id);
            continue;
        }
        // A refetch may have dropped the record; the edit is still confirmed.
        if store.replace_one(server).is_err() {
            debug!(%id, "confirmed record is no longer in the store");
        }
        overlay.confirm_change(id);
        outcome.applied.push(id);
    }
    Ok(outcome)
}

/// Merge a delete batch result, returning the ids confirmed deleted.
pub fn reconcile_delete(
    overlay: &mut PendingOverlay,
    result: Result<BatchResponse, BackendError>,
) -> Result<Vec<TodoId>, BackendError> {
    let snapshot = overlay.finish_delete_batch().unwrap_or_default();
    accepted(result)?;
    let confirmed: Vec<TodoId> = snapshot.into_iter().collect();
    overlay.confirm_deletions(&confirmed);
    Ok(confirmed)
}
