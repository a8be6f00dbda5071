//! Node-level configuration.
//!
//! Shells load configuration however they like (files, environment,
//! flags) and hand the core this typed struct; the core never reads the
//! environment itself.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// System-wide settings for one Weft node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Directory for persisted cache state (manifests).
    pub cache_dir: PathBuf,
    /// Shard cache byte cap.
    pub cache_max_bytes: u64,
    /// Complexity score above which a peer delegates.
    pub delegation_threshold: f64,
    /// Hard bound on the recursive delegation tree depth.
    pub max_delegation_depth: u32,
    /// Deadline for one chunk attempt when the job does not override it.
    pub default_chunk_timeout_ms: u64,
    /// Retries per chunk when the job does not override it.
    pub default_retry_budget: u32,
    /// Memory ceiling handed to the sandbox per chunk.
    pub chunk_memory_limit_mb: u64,
    /// Unreachable peers are hidden from the scheduler after this long.
    pub liveness_window_secs: u64,
    /// Unreachable peers are dropped from the registry after this long.
    pub peer_evict_after_secs: u64,
    /// How often the maintenance sweep runs.
    pub sweep_interval_secs: u64,
    /// Admission ceiling: total chunks in flight across all jobs.
    pub max_outstanding_chunks: usize,
    /// RAM figure the capacity formula normalizes against.
    pub baseline_ram_mb: u64,
    /// Waiting requests the executor pool accepts before pushing back.
    pub executor_queue_cap: usize,
    /// Reject work immediately when the executor pool is saturated
    /// instead of queueing.
    pub fail_fast_under_load: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./weft-cache"),
            cache_max_bytes: 512 * 1024 * 1024,
            delegation_threshold: 1.0,
            max_delegation_depth: 3,
            default_chunk_timeout_ms: 5_000,
            default_retry_budget: 3,
            chunk_memory_limit_mb: 512,
            liveness_window_secs: 120,
            peer_evict_after_secs: 3_600,
            sweep_interval_secs: 300,
            max_outstanding_chunks: 10_000,
            baseline_ram_mb: 4_096,
            executor_queue_cap: 256,
            fail_fast_under_load: false,
        }
    }
}

impl SystemConfig {
    /// Tight limits and a scratch directory, for tests.
    pub fn for_testing(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            cache_max_bytes: 16 * 1024 * 1024,
            default_chunk_timeout_ms: 2_000,
            chunk_memory_limit_mb: 64,
            max_outstanding_chunks: 256,
            executor_queue_cap: 32,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SystemConfig::default();
        assert_eq!(config.max_delegation_depth, 3);
        assert_eq!(config.default_chunk_timeout_ms, 5_000);
        assert_eq!(config.default_retry_budget, 3);
        assert_eq!(config.liveness_window_secs, 120);
        assert_eq!(config.peer_evict_after_secs, 3_600);
        assert!((config.delegation_threshold - 1.0).abs() < f64::EPSILON);
    }
}
