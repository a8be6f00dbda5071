//! # Weft Mesh Crate
//! The task scheduler: decides whether a peer acts as manager or worker
//! for a given chunk, ranks candidate workers, and tracks in-flight
//! assignments with their deadlines and retry budgets.

pub mod arena;
pub mod metrics;
pub mod score;
pub mod select;

pub use arena::{AssignmentArena, AssignmentKey, TaskAssignment};
pub use score::{
    complexity_score, decide_locus, local_capacity, operation_weight, ExecutionLocus,
    DEFAULT_BASELINE_RAM_MB, DEFAULT_DELEGATION_THRESHOLD,
};
pub use select::{select_workers, worker_fitness, MAX_WORKER_LOAD, MIN_WORKER_TRUST};
