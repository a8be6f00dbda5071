//! Local capability probing.
//!
//! Reports CPU, memory, disk, and bandwidth figures used by the scheduler's
//! delegation decision. Values are read from OS facilities where available
//! and cached for a short interval; facilities with no OS source report the
//! last observed value and mark the snapshot stale.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::{CpuExt, DiskExt, System, SystemExt};

/// How long a probe result stays fresh before the next request recomputes it.
const PROBE_CACHE_TTL: Duration = Duration::from_secs(5);

/// Default bandwidth estimate reported before any observation exists.
const DEFAULT_BANDWIDTH_MBPS: f64 = 100.0;

/// Snapshot of the local node's capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeCapacity {
    /// Number of logical CPU cores.
    pub cpu_cores: u32,
    /// Total RAM in megabytes.
    pub ram_mb: u64,
    /// Current CPU load in [0, 1].
    pub current_load: f64,
    /// Free disk space in megabytes across mounted disks.
    pub disk_free_mb: u64,
    /// Estimated usable bandwidth in Mbps.
    pub est_bandwidth_mbps: f64,
    /// True when at least one figure came from a cached observation rather
    /// than a live OS facility.
    pub stale: bool,
}

impl Default for NodeCapacity {
    fn default() -> Self {
        Self {
            cpu_cores: 1,
            ram_mb: 1024,
            current_load: 0.0,
            disk_free_mb: 0,
            est_bandwidth_mbps: DEFAULT_BANDWIDTH_MBPS,
            stale: true,
        }
    }
}

struct ProbeState {
    system: System,
    cached: Option<(Instant, NodeCapacity)>,
    last_bandwidth_mbps: Option<f64>,
}

/// Probes local CPU cores, RAM, load, disk, and bandwidth.
pub struct CapabilityProbe {
    state: Mutex<ProbeState>,
}

impl CapabilityProbe {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProbeState {
                system: System::new_all(),
                cached: None,
                last_bandwidth_mbps: None,
            }),
        }
    }

    /// Records an observed transfer rate; consumed by later probes since no
    /// OS facility reports usable bandwidth directly.
    pub fn record_bandwidth(&self, mbps: f64) {
        let mut state = self.state.lock().unwrap();
        state.last_bandwidth_mbps = Some(mbps);
        if let Some((_, ref mut capacity)) = state.cached {
            capacity.est_bandwidth_mbps = mbps;
        }
    }

    /// Returns the current capacity snapshot, recomputing it when the cached
    /// value is older than 5 seconds.
    pub fn probe(&self) -> NodeCapacity {
        let mut state = self.state.lock().unwrap();
        if let Some((at, ref capacity)) = state.cached {
            if at.elapsed() < PROBE_CACHE_TTL {
                return capacity.clone();
            }
        }

        state.system.refresh_cpu();
        state.system.refresh_memory();
        state.system.refresh_disks_list();
        state.system.refresh_disks();

        let cpu_cores = state.system.cpus().len().max(1) as u32;
        let current_load =
            (f64::from(state.system.global_cpu_info().cpu_usage()) / 100.0).clamp(0.0, 1.0);
        let ram_mb = state.system.total_memory() / (1024 * 1024);
        let disk_free_mb = state
            .system
            .disks()
            .iter()
            .map(|d| d.available_space() / (1024 * 1024))
            .sum();

        // Bandwidth has no OS source; reuse the last observation and mark
        // the snapshot stale when we never saw one.
        let (est_bandwidth_mbps, stale) = match state.last_bandwidth_mbps {
            Some(mbps) => (mbps, false),
            None => (DEFAULT_BANDWIDTH_MBPS, true),
        };

        let capacity = NodeCapacity {
            cpu_cores,
            ram_mb,
            current_load,
            disk_free_mb,
            est_bandwidth_mbps,
            stale,
        };
        state.cached = Some((Instant::now(), capacity.clone()));
        capacity
    }
}

impl Default for CapabilityProbe {
    fn default() -> Self {
        Self::new()
    }
}
