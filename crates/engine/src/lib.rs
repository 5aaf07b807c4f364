pub mod config;
pub mod error;
pub mod overlay;
pub mod reconcile;
pub mod scheduler;
pub mod store;
pub mod view;

pub use config::SyncConfig;
pub use error::EngineError;
pub use overlay::{PendingChange, PendingOverlay};
pub use reconcile::{BatchOutcome, UpdateOutcome};
pub use scheduler::{BatchKind, BatchScheduler, DebounceTimer, OutboundBatch};
pub use store::EntityStore;
pub use view::TodoView;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use todosync_core::{
    BackendError, BatchResponse, Clock, ListQuery, Millis, NewTodo, Priority, SystemClock, Todo,
    TodoBackend, TodoId, TodoPatch,
};

/// Progress of a request kind, for UI indicators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Idle,
    Loading,
    Failed,
}

/// Owns the todo state and mediates every intent, timer firing and response.
///
/// The engine never performs batch I/O on its own: [`SyncEngine::poll`] hands
/// due batches to the host, which delivers each result back through
/// [`SyncEngine::complete_batch`]. Anything dispatched between the two is
/// reconciled against the batch rather than overwritten by it.
pub struct SyncEngine<C: Clock = SystemClock> {
    clock: C,
    config: SyncConfig,
    store: EntityStore,
    overlay: PendingOverlay,
    scheduler: BatchScheduler,
    load_status: RequestStatus,
    last_error: Option<String>,
    update_status: RequestStatus,
    delete_status: RequestStatus,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> SyncEngine<C> {
    pub fn with_clock(config: SyncConfig, clock: C) -> Self {
        Self {
            clock,
            scheduler: BatchScheduler::new(&config),
            config,
            store: EntityStore::new(),
            overlay: PendingOverlay::new(),
            load_status: RequestStatus::Idle,
            last_error: None,
            update_status: RequestStatus::Idle,
            delete_status: RequestStatus::Idle,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn overlay(&self) -> &PendingOverlay {
        &self.overlay
    }

    pub fn now(&self) -> Millis {
        self.clock.now()
    }

    pub fn load_status(&self) -> RequestStatus {
        self.load_status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn update_status(&self) -> RequestStatus {
        self.update_status
    }

    pub fn delete_status(&self) -> RequestStatus {
        self.delete_status
    }

    pub fn pending_change(&self, id: TodoId) -> Option<&PendingChange> {
        self.overlay.change(id)
    }

    pub fn is_pending_deletion(&self, id: TodoId) -> bool {
        self.overlay.is_pending_deletion(id)
    }

    // ========================================================================
    // Fetch / Create (direct round trips)
    // ========================================================================

    /// Replace the store with the backend's listing. Pending edits survive the
    /// refetch and keep overlaying whatever comes back.
    pub fn fetch_todos<B: TodoBackend>(
        &mut self,
        backend: &mut B,
        query: &ListQuery,
    ) -> Result<usize, EngineError> {
        self.load_status = RequestStatus::Loading;
        self.last_error = None;
        match backend.list_todos(query) {
            Ok(page) => {
                let fetched = page.todos.len();
                let deleted = self.overlay.deletions().clone();
                self.store
                    .set_all(page.todos.into_iter().filter(|t| !deleted.contains(&t.id)));
                self.load_status = RequestStatus::Idle;
                debug!(fetched, total = page.total, "todos fetched");
                Ok(self.store.len())
            }
            Err(err) => {
                warn!(error = %err, "fetching todos failed");
                self.load_status = RequestStatus::Failed;
                self.last_error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Validate locally, create on the backend, then add the server record.
    pub fn create_todo<B: TodoBackend>(
        &mut self,
        backend: &mut B,
        title: &str,
        priority: Priority,
    ) -> Result<Todo, EngineError> {
        let new = NewTodo::new(title, priority)?;
        let todo = backend.create_todo(&new)?;
        self.store.add_one(todo.clone());
        info!(id = %todo.id, "todo created");
        Ok(todo)
    }

    // ========================================================================
    // Optimistic intents
    // ========================================================================

    /// Record an edit and restart the update debounce window. Invalid or empty
    /// patches, unknown ids and ids pending deletion are rejected without
    /// touching the overlay.
    pub fn dispatch_edit(&mut self, id: TodoId, patch: TodoPatch) -> Result<(), EngineError> {
        let patch = patch.validated()?;
        if patch.is_empty() {
            return Err(EngineError::EmptyPatch(id));
        }
        if self.overlay.is_pending_deletion(id) {
            debug!(%id, "dropping edit for todo pending deletion");
            return Err(EngineError::PendingDeletion(id));
        }
        if !self.store.contains(id) {
            return Err(EngineError::NotFound(id));
        }
        let now = self.clock.now();
        self.overlay.record_edit(id, patch, now)?;
        self.scheduler.arm(BatchKind::Update, now);
        debug!(%id, "edit recorded");
        Ok(())
    }

    /// Remove a todo from view immediately and queue its deletion.
    pub fn dispatch_delete(&mut self, id: TodoId) -> Result<(), EngineError> {
        self.overlay.record_deletion(&mut self.store, id)?;
        let now = self.clock.now();
        self.scheduler.arm(BatchKind::Delete, now);
        debug!(%id, "deletion recorded");
        Ok(())
    }

    // ========================================================================
    // Derived views
    // ========================================================================

    pub fn view_of(&self, id: TodoId) -> Option<TodoView> {
        view::effective_view(&self.store, &self.overlay, id)
    }

    pub fn views(&self) -> Vec<TodoView> {
        view::effective_views(&self.store, &self.overlay)
    }

    // ========================================================================
    // Batch dispatch
    // ========================================================================

    /// Earliest time at which [`SyncEngine::poll`] has work to do.
    pub fn next_deadline(&self) -> Option<Millis> {
        self.scheduler.next_deadline()
    }

    /// Fire due debounce timers and return the batches to send.
    pub fn poll(&mut self) -> Vec<OutboundBatch> {
        let now = self.clock.now();
        let batches = self.scheduler.poll(now, &mut self.overlay);
        for batch in &batches {
            self.mark_sent(batch);
        }
        batches
    }

    /// Re-send whichever batch kinds last failed, without waiting for the
    /// debounce window.
    pub fn retry_failed_batch(&mut self) -> Vec<OutboundBatch> {
        let mut batches = Vec::new();
        for kind in [BatchKind::Update, BatchKind::Delete] {
            if self.status(kind) != RequestStatus::Failed {
                continue;
            }
            match self.scheduler.fire(kind, &mut self.overlay) {
                Some(batch) => {
                    info!(kind = kind.as_str(), ids = batch.request.ids.len(), "retrying batch");
                    self.mark_sent(&batch);
                    batches.push(batch);
                }
                None if !self.in_flight(kind) => {
                    // Nothing left to retry: every failed entry was superseded.
                    *self.status_mut(kind) = RequestStatus::Idle;
                }
                None => {}
            }
        }
        batches
    }

    /// Deliver a batch result. `None` when the batch failed or no batch of
    /// `kind` was in flight.
    pub fn complete_batch(
        &mut self,
        kind: BatchKind,
        result: Result<BatchResponse, BackendError>,
    ) -> Option<BatchOutcome> {
        match kind {
            BatchKind::Update => self.complete_update_batch(result).map(BatchOutcome::Updated),
            BatchKind::Delete => self.complete_delete_batch(result).map(BatchOutcome::Deleted),
        }
    }

    /// Reconcile an update batch result. A result with no update batch in
    /// flight is dropped and leaves the status alone.
    pub fn complete_update_batch(
        &mut self,
        result: Result<BatchResponse, BackendError>,
    ) -> Option<UpdateOutcome> {
        if !self.in_flight(BatchKind::Update) {
            warn!("update result with no batch in flight, ignoring");
            return None;
        }
        let outcome = match reconcile::reconcile_update(&mut self.store, &mut self.overlay, result) {
            Ok(outcome) => {
                info!(
                    applied = outcome.applied.len(),
                    skipped = outcome.skipped.len(),
                    "update batch reconciled"
                );
                if let Some(&id) = outcome.missing.first() {
                    // Stale ids keep their edits until retried or deleted.
                    warn!(missing = outcome.missing.len(), "server did not return every updated todo");
                    self.update_status = RequestStatus::Failed;
                    self.last_error = Some(BackendError::NotFound(id).to_string());
                } else {
                    self.update_status = RequestStatus::Idle;
                }
                Some(outcome)
            }
            Err(err) => {
                warn!(error = %err, pending = self.overlay.changes().count(), "update batch failed");
                self.update_status = RequestStatus::Failed;
                self.last_error = Some(err.to_string());
                None
            }
        };
        let now = self.clock.now();
        let succeeded = self.update_status == RequestStatus::Idle;
        self.scheduler
            .batch_finished(BatchKind::Update, now, succeeded, self.overlay.has_changes());
        outcome
    }

    pub fn complete_delete_batch(
        &mut self,
        result: Result<BatchResponse, BackendError>,
    ) -> Option<Vec<TodoId>> {
        if !self.in_flight(BatchKind::Delete) {
            warn!("delete result with no batch in flight, ignoring");
            return None;
        }
        let confirmed = match reconcile::reconcile_delete(&mut self.overlay, result) {
            Ok(ids) => {
                info!(confirmed = ids.len(), "delete batch reconciled");
                self.delete_status = RequestStatus::Idle;
                Some(ids)
            }
            Err(err) => {
                warn!(error = %err, pending = self.overlay.deletions().len(), "delete batch failed");
                self.delete_status = RequestStatus::Failed;
                self.last_error = Some(err.to_string());
                None
            }
        };
        let now = self.clock.now();
        self.scheduler.batch_finished(
            BatchKind::Delete,
            now,
            confirmed.is_some(),
            self.overlay.has_deletions(),
        );
        confirmed
    }

    /// Synchronous host loop step: send every due batch through `backend` and
    /// reconcile the result before returning. Returns the number of batches sent.
    pub fn flush_due<B: TodoBackend>(&mut self, backend: &mut B) -> usize {
        let batches = self.poll();
        let sent = batches.len();
        for batch in batches {
            let result = backend.batch_update(&batch.request);
            self.complete_batch(batch.kind, result);
        }
        sent
    }

    fn mark_sent(&mut self, batch: &OutboundBatch) {
        info!(
            kind = batch.kind.as_str(),
            ids = batch.request.ids.len(),
            "batch dispatched"
        );
        *self.status_mut(batch.kind) = RequestStatus::Loading;
    }

    fn in_flight(&self, kind: BatchKind) -> bool {
        match kind {
            BatchKind::Update => self.overlay.in_flight_updates().is_some(),
            BatchKind::Delete => self.overlay.in_flight_deletes().is_some(),
        }
    }

    fn status(&self, kind: BatchKind) -> RequestStatus {
        match kind {
            BatchKind::Update => self.update_status,
            BatchKind::Delete => self.delete_status,
        }
    }

    fn status_mut(&mut self, kind: BatchKind) -> &mut RequestStatus {
        match kind {
            BatchKind::Update => &mut self.update_status,
            BatchKind::Delete => &mut self.delete_status,
        }
    }
}
