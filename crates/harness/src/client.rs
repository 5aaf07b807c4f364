use std::error::Error;

use todosync_core::{
    BackendError, ListQuery, ManualClock, Millis, Priority, Todo, TodoId, TodoPatch,
};
use todosync_engine::{BatchOutcome, EngineError, SyncConfig, SyncEngine, TodoView};
use todosync_storage::SqliteBackend;

use crate::network::{NetworkConfig, SimulatedNetwork};

/// Upper bound on simulated time for [`TestClient::settle`].
const SETTLE_LIMIT_MS: Millis = 600_000;

/// A client engine wired to a simulated server, driven by a single-threaded
/// event loop over a manual clock.
pub struct TestClient {
    pub clock: ManualClock,
    pub engine: SyncEngine<ManualClock>,
    pub network: SimulatedNetwork,
    /// Outcomes of every successfully reconciled batch, in delivery order.
    pub outcomes: Vec<BatchOutcome>,
}

impl TestClient {
    pub fn new() -> Result<Self, Box<dyn Error>> {
        Self::with_config(SyncConfig::default(), NetworkConfig::default())
    }

    pub fn with_config(sync: SyncConfig, net: NetworkConfig) -> Result<Self, Box<dyn Error>> {
        crate::logging::init();
        let clock = ManualClock::new(1_700_000_000_000);
        let backend = SqliteBackend::open_in_memory()?.with_clock(clock.clone());
        Ok(Self {
            engine: SyncEngine::with_clock(sync, clock.clone()),
            network: SimulatedNetwork::new(backend, net),
            outcomes: Vec::new(),
            clock,
        })
    }

    pub fn now(&self) -> Millis {
        self.engine.now()
    }

    pub fn server(&self) -> &SqliteBackend {
        self.network.backend()
    }

    /// Server-side copy of a todo.
    pub fn server_todo(&self, id: TodoId) -> Result<Option<Todo>, Box<dyn Error>> {
        Ok(self.network.backend().get_todo(id)?)
    }

    pub fn create(&mut self, title: &str, priority: Priority) -> Result<Todo, EngineError> {
        self.engine
            .create_todo(self.network.backend_mut(), title, priority)
    }

    pub fn fetch(&mut self, query: &ListQuery) -> Result<usize, EngineError> {
        self.engine.fetch_todos(self.network.backend_mut(), query)
    }

    pub fn edit(&mut self, id: TodoId, patch: TodoPatch) -> Result<(), EngineError> {
        self.engine.dispatch_edit(id, patch)
    }

    pub fn delete(&mut self, id: TodoId) -> Result<(), EngineError> {
        self.engine.dispatch_delete(id)
    }

    pub fn view(&self, id: TodoId) -> Option<TodoView> {
        self.engine.view_of(id)
    }

    pub fn fail_next(&mut self, err: BackendError) {
        self.network.fail_next(err);
    }

    /// Trigger a manual retry and put any resulting batches on the wire.
    pub fn retry(&mut self) -> Result<usize, BackendError> {
        let batches = self.engine.retry_failed_batch();
        let count = batches.len();
        let now = self.now();
        for batch in batches {
            self.network.send(batch, now)?;
        }
        Ok(count)
    }

    /// Run the event loop for `ms` of simulated time. At each instant,
    /// responses are delivered before timers fire.
    pub fn advance(&mut self, ms: Millis) -> Result<(), BackendError> {
        let target = self.now() + ms;
        loop {
            let next = [self.engine.next_deadline(), self.network.next_delivery()]
                .into_iter()
                .flatten()
                .min();
            match next {
                Some(at) if at <= target => {
                    self.clock.set(at.max(self.now()));
                    self.pump()?;
                }
                _ => break,
            }
        }
        self.clock.set(target);
        self.pump()
    }

    /// Advance until no timer is armed and nothing is in flight.
    pub fn settle(&mut self) -> Result<(), BackendError> {
        let limit = self.now() + SETTLE_LIMIT_MS;
        while self.engine.next_deadline().is_some() || self.network.in_flight_count() > 0 {
            if self.now() >= limit {
                return Err(BackendError::Network("event loop did not settle".into()));
            }
            let next = [self.engine.next_deadline(), self.network.next_delivery()]
                .into_iter()
                .flatten()
                .min()
                .unwrap_or(limit);
            self.clock.set(next.max(self.now()));
            self.pump()?;
        }
        Ok(())
    }

    fn pump(&mut self) -> Result<(), BackendError> {
        let now = self.now();
        for (kind, response) in self.network.take_due(now) {
            self.outcomes.extend(self.engine.complete_batch(kind, response));
        }
        for batch in self.engine.poll() {
            self.network.send(batch, now)?;
        }
        Ok(())
    }
}
