//! The delegation decision.
//!
//! A peer receiving work scores the chunk against its own capacity. Above
//! the threshold, with healthy peers available and depth to spare, it acts
//! as a manager and delegates; otherwise it acts as a worker and executes
//! locally.

use weft_common::NodeCapacity;
use weft_protocol::LocalityPreference;

/// Default complexity threshold above which a peer delegates.
pub const DEFAULT_DELEGATION_THRESHOLD: f64 = 1.0;

/// RAM figure a capacity of 1.0 is normalized against.
pub const DEFAULT_BASELINE_RAM_MB: u64 = 4096;

/// Where a chunk executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionLocus {
    /// Act as manager: hand the chunk to selected workers.
    Delegate,
    /// Act as worker: run the chunk in the local sandbox.
    Local,
}

/// Weight of one input byte as a function of module size.
pub fn operation_weight(module_len: usize) -> f64 {
    1.0 + 0.1 * (module_len as f64 / 65536.0)
}

/// Effective local compute capacity: idle cores scaled by the RAM ratio.
pub fn local_capacity(capacity: &NodeCapacity, baseline_ram_mb: u64) -> f64 {
    let idle_cores = f64::from(capacity.cpu_cores) * (1.0 - capacity.current_load);
    let ram_ratio = capacity.ram_mb as f64 / baseline_ram_mb.max(1) as f64;
    (idle_cores * ram_ratio).max(f64::EPSILON)
}

/// Complexity of running `input_len` bytes of work here.
pub fn complexity_score(
    input_len: usize,
    module_len: usize,
    capacity: &NodeCapacity,
    baseline_ram_mb: u64,
) -> f64 {
    (input_len as f64 * operation_weight(module_len)) / local_capacity(capacity, baseline_ram_mb)
}

/// The manager-versus-worker decision for one chunk.
///
/// At the depth bound the peer always executes locally, whatever the
/// score; with no healthy peers the local fallback applies.
pub fn decide_locus(
    score: f64,
    threshold: f64,
    locality: LocalityPreference,
    healthy_peer_count: usize,
    current_depth: u32,
    max_delegation_depth: u32,
) -> ExecutionLocus {
    if current_depth >= max_delegation_depth {
        return ExecutionLocus::Local;
    }
    if healthy_peer_count == 0 {
        return ExecutionLocus::Local;
    }
    if score > threshold * locality.threshold_multiplier() {
        ExecutionLocus::Delegate
    } else {
        ExecutionLocus::Local
    }
}
