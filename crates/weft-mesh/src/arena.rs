//! Assignment arena.
//!
//! In-flight dispatches are tracked in a flat map keyed by
//! `(job, chunk, attempt)`; tasks hold only the key, never back-pointers
//! into job state. One assignment covers the whole redundancy group for
//! that attempt and carries a single deadline.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use weft_common::{JobId, PeerId};

/// Identity of one dispatch attempt for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssignmentKey {
    pub job_id: JobId,
    pub chunk_index: u32,
    pub attempt: u32,
}

/// One dispatched attempt: the workers holding a copy and the shared
/// deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAssignment {
    pub key: AssignmentKey,
    /// Workers this attempt was dispatched to (the local node appears by
    /// its own peer id).
    pub workers: Vec<PeerId>,
    /// Workers that have not answered yet.
    pub pending: Vec<PeerId>,
    /// Absolute deadline, Unix milliseconds.
    pub deadline_unix_ms: u64,
}

impl TaskAssignment {
    pub fn new(key: AssignmentKey, workers: Vec<PeerId>, deadline_unix_ms: u64) -> Self {
        Self {
            key,
            pending: workers.clone(),
            workers,
            deadline_unix_ms,
        }
    }
}

/// Owner of all in-flight assignments for the jobs a coordinator drives.
#[derive(Debug, Default)]
pub struct AssignmentArena {
    assignments: HashMap<AssignmentKey, TaskAssignment>,
}

impl AssignmentArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, assignment: TaskAssignment) {
        self.assignments.insert(assignment.key, assignment);
    }

    pub fn get(&self, key: &AssignmentKey) -> Option<&TaskAssignment> {
        self.assignments.get(key)
    }

    /// Record that `worker` answered for `key`. Returns true when the key
    /// was live and the worker was still pending.
    pub fn mark_responded(&mut self, key: &AssignmentKey, worker: &PeerId) -> bool {
        match self.assignments.get_mut(key) {
            Some(assignment) => {
                let before = assignment.pending.len();
                assignment.pending.retain(|w| w != worker);
                assignment.pending.len() != before
            }
            None => false,
        }
    }

    /// Remove a terminal assignment.
    pub fn remove(&mut self, key: &AssignmentKey) -> Option<TaskAssignment> {
        self.assignments.remove(key)
    }

    /// Drain every assignment whose deadline has passed at `now_unix_ms`.
    pub fn take_expired(&mut self, now_unix_ms: u64) -> Vec<TaskAssignment> {
        let expired: Vec<AssignmentKey> = self
            .assignments
            .values()
            .filter(|a| a.deadline_unix_ms <= now_unix_ms)
            .map(|a| a.key)
            .collect();
        expired
            .into_iter()
            .filter_map(|key| self.assignments.remove(&key))
            .collect()
    }

    /// Workers that ever held a copy of this chunk, across attempts; used
    /// to keep redundant re-dispatches on disjoint workers.
    pub fn workers_ever_assigned(&self, job_id: JobId, chunk_index: u32) -> HashSet<PeerId> {
        self.assignments
            .values()
            .filter(|a| a.key.job_id == job_id && a.key.chunk_index == chunk_index)
            .flat_map(|a| a.workers.iter().cloned())
            .collect()
    }

    /// Number of live assignments for a job.
    pub fn outstanding(&self, job_id: JobId) -> usize {
        self.assignments
            .values()
            .filter(|a| a.key.job_id == job_id)
            .count()
    }

    /// Drop every assignment of a job (cancellation).
    pub fn clear_job(&mut self, job_id: JobId) -> Vec<TaskAssignment> {
        let keys: Vec<AssignmentKey> = self
            .assignments
            .keys()
            .filter(|k| k.job_id == job_id)
            .copied()
            .collect();
        keys.into_iter()
            .filter_map(|key| self.assignments.remove(&key))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}
