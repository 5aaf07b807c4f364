use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use todosync_core::{BatchRequest, Millis};

use crate::config::SyncConfig;
use crate::overlay::PendingOverlay;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchKind {
    Update,
    Delete,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// A batch request handed to the host for delivery to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundBatch {
    pub kind: BatchKind,
    pub request: BatchRequest,
}

/// A resettable one-shot deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceTimer {
    window: Millis,
    deadline: Option<Millis>,
}

impl DebounceTimer {
    pub fn new(window: Millis) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn deadline(&self) -> Option<Millis> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Start, or restart, the quiescence window from `now`.
    pub fn arm(&mut self, now: Millis) {
        self.deadline = Some(now.saturating_add(self.window));
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Disarm and report true if the deadline has passed.
    pub fn fire_if_due(&mut self, now: Millis) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Two independent debounce timers, one per [`BatchKind`], deciding when the
/// overlay gets snapshotted into a batch request.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    update: DebounceTimer,
    delete: DebounceTimer,
    update_deferred: bool,
    delete_deferred: bool,
}

impl BatchScheduler {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            update: DebounceTimer::new(config.update_debounce_ms),
            delete: DebounceTimer::new(config.delete_debounce_ms),
            update_deferred: false,
            delete_deferred: false,
        }
    }

    pub fn timer(&self, kind: BatchKind) -> &DebounceTimer {
        match kind {
            BatchKind::Update => &self.update,
            BatchKind::Delete => &self.delete,
        }
    }

    fn timer_mut(&mut self, kind: BatchKind) -> &mut DebounceTimer {
        match kind {
            BatchKind::Update => &mut self.update,
            BatchKind::Delete => &mut self.delete,
        }
    }

    fn deferred_mut(&mut self, kind: BatchKind) -> &mut bool {
        match kind {
            BatchKind::Update => &mut self.update_deferred,
            BatchKind::Delete => &mut self.delete_deferred,
        }
    }

    pub fn arm(&mut self, kind: BatchKind, now: Millis) {
        self.timer_mut(kind).arm(now);
        trace!(kind = kind.as_str(), deadline = ?self.timer(kind).deadline(), "debounce armed");
    }

    /// Earliest armed deadline across both timers.
    pub fn next_deadline(&self) -> Option<Millis> {
        [self.update.deadline(), self.delete.deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    /// Fire every timer whose window has elapsed.
    pub fn poll(&mut self, now: Millis, overlay: &mut PendingOverlay) -> Vec<OutboundBatch> {
        let mut out = Vec::new();
        for kind in [BatchKind::Update, BatchKind::Delete] {
            if self.timer_mut(kind).fire_if_due(now) {
                out.extend(self.fire(kind, overlay));
            }
        }
        out
    }

    /// Fire `kind` immediately, bypassing the debounce window. A batch already
    /// in flight turns the firing into a deferral that re-arms on completion.
    pub fn fire(&mut self, kind: BatchKind, overlay: &mut PendingOverlay) -> Option<OutboundBatch> {
        self.timer_mut(kind).cancel();
        let in_flight = match kind {
            BatchKind::Update => overlay.in_flight_updates().is_some(),
            BatchKind::Delete => overlay.in_flight_deletes().is_some(),
        };
        if in_flight {
            debug!(kind = kind.as_str(), "batch already in flight, deferring");
            *self.deferred_mut(kind) = true;
            return None;
        }
        let request = match kind {
            BatchKind::Update => overlay.begin_update_batch(),
            BatchKind::Delete => overlay.begin_delete_batch(),
        }?;
        Some(OutboundBatch { kind, request })
    }

    /// Called once a batch of `kind` resolves. Re-arms the timer if a firing
    /// was deferred behind a batch that succeeded and the overlay still has
    /// work of that kind. Failed batches wait for an explicit retry.
    pub fn batch_finished(&mut self, kind: BatchKind, now: Millis, succeeded: bool, has_work: bool) {
        let deferred = std::mem::take(self.deferred_mut(kind));
        if deferred && succeeded && has_work && !self.timer(kind).is_armed() {
            self.arm(kind, now);
        }
    }
}
