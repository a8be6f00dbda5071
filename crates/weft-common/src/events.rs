//! Structured event observer.
//!
//! The core does not log to any specific sink. Components emit structured
//! events through a collaborator-supplied [`EventObserver`]; shells attach
//! whatever exporter they want.

use crate::{JobId, PeerId};
use std::sync::Mutex;

/// Events emitted by the orchestrator core.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    /// A job moved to a new lifecycle state.
    JobStateChanged { job_id: JobId, state: String },
    /// A chunk was dispatched to a worker (local dispatch uses the node's
    /// own peer id).
    ChunkDispatched {
        job_id: JobId,
        chunk_index: u32,
        worker: PeerId,
        attempt: u32,
    },
    /// A chunk result was accepted.
    ChunkCompleted {
        job_id: JobId,
        chunk_index: u32,
        worker: PeerId,
    },
    /// A chunk result was rejected by the verifier.
    VerificationRejected {
        job_id: JobId,
        chunk_index: u32,
        worker: PeerId,
    },
    /// An assignment missed its deadline.
    AssignmentTimedOut {
        job_id: JobId,
        chunk_index: u32,
        worker: PeerId,
        attempt: u32,
    },
    /// A peer's trust score was adjusted.
    TrustAdjusted {
        peer: PeerId,
        delta: f64,
        score: f64,
    },
    /// A peer was marked unreachable.
    PeerUnreachable { peer: PeerId },
    /// A cache entry was evicted to make room.
    ShardEvicted { key: String, size_bytes: u64 },
}

/// Sink for structured events. Implementations must be cheap; they are
/// called from hot paths.
pub trait EventObserver: Send + Sync {
    fn on_event(&self, event: &OrchestratorEvent);
}

/// Observer that drops every event.
#[derive(Debug, Default)]
pub struct NullObserver;

impl EventObserver for NullObserver {
    fn on_event(&self, _event: &OrchestratorEvent) {}
}

/// Observer that records events in memory; used by tests.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<OrchestratorEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything recorded so far.
    pub fn events(&self) -> Vec<OrchestratorEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Counts recorded events matching `predicate`.
    pub fn count_matching(&self, predicate: impl Fn(&OrchestratorEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| predicate(e)).count()
    }
}

impl EventObserver for RecordingObserver {
    fn on_event(&self, event: &OrchestratorEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
