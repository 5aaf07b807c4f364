use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use todosync_core::{BackendError, BatchRequest, BatchResponse, Millis, TodoBackend};
use todosync_engine::{BatchKind, OutboundBatch};
use todosync_storage::SqliteBackend;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Fixed round-trip latency for every batch call.
    pub latency_ms: Millis,
    /// Extra random latency in `0..=jitter_ms`, drawn from a seeded RNG.
    pub jitter_ms: Millis,
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            latency_ms: 300,
            jitter_ms: 0,
            seed: 0,
        }
    }
}

/// A batch call as the server received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentBatch {
    pub kind: BatchKind,
    pub request: BatchRequest,
    pub sent_at: Millis,
}

struct InFlight {
    kind: BatchKind,
    deliver_at: Millis,
    response: Result<Vec<u8>, BackendError>,
}

/// Carries batch requests to a [`SqliteBackend`] and their responses back
/// after a simulated delay. Requests and responses cross as MessagePack.
pub struct SimulatedNetwork {
    backend: SqliteBackend,
    config: NetworkConfig,
    rng: StdRng,
    in_flight: Vec<InFlight>,
    injected_failures: VecDeque<BackendError>,
    sent: Vec<SentBatch>,
}

impl SimulatedNetwork {
    pub fn new(backend: SqliteBackend, config: NetworkConfig) -> Self {
        Self {
            backend,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            in_flight: Vec::new(),
            injected_failures: VecDeque::new(),
            sent: Vec::new(),
        }
    }

    pub fn backend(&self) -> &SqliteBackend {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut SqliteBackend {
        &mut self.backend
    }

    /// Every batch that reached the wire, oldest first.
    pub fn sent(&self) -> &[SentBatch] {
        &self.sent
    }

    pub fn sent_of(&self, kind: BatchKind) -> Vec<&SentBatch> {
        self.sent.iter().filter(|s| s.kind == kind).collect()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Make the next batch call fail with `err` without reaching the server.
    pub fn fail_next(&mut self, err: BackendError) {
        self.injected_failures.push_back(err);
    }

    /// Put `batch` on the wire at `now`. The server applies it immediately;
    /// the response is held until the simulated latency elapses.
    pub fn send(&mut self, batch: OutboundBatch, now: Millis) -> Result<(), BackendError> {
        let bytes = batch.request.to_msgpack()?;
        let request = BatchRequest::from_msgpack(&bytes)?;
        self.sent.push(SentBatch {
            kind: batch.kind,
            request: request.clone(),
            sent_at: now,
        });

        let response = match self.injected_failures.pop_front() {
            Some(err) => Err(err),
            None => self
                .backend
                .batch_update(&request)
                .and_then(|response| response.to_msgpack().map_err(BackendError::from)),
        };

        let jitter = if self.config.jitter_ms > 0 {
            self.rng.gen_range(0..=self.config.jitter_ms)
        } else {
            0
        };
        let deliver_at = now + self.config.latency_ms + jitter;
        debug!(kind = batch.kind.as_str(), ids = request.ids.len(), deliver_at, "batch on the wire");
        self.in_flight.push(InFlight {
            kind: batch.kind,
            deliver_at,
            response,
        });
        Ok(())
    }

    pub fn next_delivery(&self) -> Option<Millis> {
        self.in_flight.iter().map(|f| f.deliver_at).min()
    }

    /// Responses whose delivery time has come, in delivery order.
    pub fn take_due(&mut self, now: Millis) -> Vec<(BatchKind, Result<BatchResponse, BackendError>)> {
        let mut due = Vec::new();
        let mut waiting = Vec::new();
        for flight in self.in_flight.drain(..) {
            if flight.deliver_at <= now {
                due.push(flight);
            } else {
                waiting.push(flight);
            }
        }
        self.in_flight = waiting;
        due.sort_by_key(|f| f.deliver_at);
        due.into_iter()
            .map(|f| {
                let response = f
                    .response
                    .and_then(|bytes| BatchResponse::from_msgpack(&bytes).map_err(BackendError::from));
                (f.kind, response)
            })
            .collect()
    }
}
