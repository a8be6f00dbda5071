//! Worker selection.
//!
//! Candidates come from a registry snapshot; peers that are unreachable,
//! overloaded, distrusted, or already hold a redundant copy of the chunk
//! are filtered out, the rest are ranked by a composite fitness, and the
//! top R are picked. The whole procedure is deterministic given the same
//! snapshot.

use crate::metrics;
use log::debug;
use std::collections::HashSet;
use weft_common::PeerId;
use weft_peers::PeerRecord;

/// Peers at or above this load are not selected.
pub const MAX_WORKER_LOAD: f64 = 0.9;

/// Peers below this trust score are not selected.
pub const MIN_WORKER_TRUST: f64 = 0.2;

/// RTT at or beyond this normalizes to the worst score.
const RTT_CEILING_MS: f64 = 1000.0;

/// Composite fitness of one candidate. `capacity_share` is the peer's
/// idle cores as a fraction of all idle cores in the candidate set.
pub fn worker_fitness(record: &PeerRecord, capacity_share: f64) -> f64 {
    let normalized_rtt = (record.quality.rtt_ms / RTT_CEILING_MS).clamp(0.0, 1.0);
    0.4 * record.trust
        + 0.3 * (1.0 - record.capacity.load)
        + 0.2 * (1.0 - normalized_rtt)
        + 0.1 * capacity_share
}

/// Pick up to `redundancy` distinct workers for one chunk.
pub fn select_workers(
    snapshot: &[PeerRecord],
    redundancy: usize,
    exclude: &HashSet<PeerId>,
) -> Vec<PeerId> {
    let candidates: Vec<&PeerRecord> = snapshot
        .iter()
        .filter(|r| {
            r.reachable
                && r.capacity.load < MAX_WORKER_LOAD
                && r.trust >= MIN_WORKER_TRUST
                && !exclude.contains(&r.id)
        })
        .collect();

    if candidates.is_empty() {
        return Vec::new();
    }

    let total_idle_cores: f64 = candidates
        .iter()
        .map(|r| f64::from(r.capacity.cpu_cores) * (1.0 - r.capacity.load))
        .sum();

    let mut ranked: Vec<(f64, &PeerRecord)> = candidates
        .into_iter()
        .map(|r| {
            let idle = f64::from(r.capacity.cpu_cores) * (1.0 - r.capacity.load);
            let share = if total_idle_cores > 0.0 {
                idle / total_idle_cores
            } else {
                0.0
            };
            (worker_fitness(r, share), r)
        })
        .collect();

    // Rank descending by fitness; ties break on peer id so the outcome is
    // stable across runs.
    ranked.sort_by(|(fa, ra), (fb, rb)| {
        fb.partial_cmp(fa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| ra.id.cmp(&rb.id))
    });

    let picked: Vec<PeerId> = ranked
        .into_iter()
        .take(redundancy)
        .map(|(_, r)| r.id.clone())
        .collect();
    metrics::SELECT_WORKER_CALLS.inc();
    debug!(
        "[Scheduler] Selected {} worker(s) from {} snapshot entries",
        picked.len(),
        snapshot.len()
    );
    picked
}
