//! # Weft Peers Crate
//! Registry of known peers with connection quality, advertised capacity,
//! trust scores, and liveness tracking. The scheduler consumes snapshots;
//! the registry exclusively owns the records.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use weft_common::{EventObserver, NullObserver, OrchestratorEvent, PeerId, TimeProvider};

pub mod metrics;

/// EWMA smoothing factor for quality observations.
pub const QUALITY_EWMA_ALPHA: f64 = 0.3;

/// Trust delta for a successfully verified execution.
pub const TRUST_DELTA_SUCCESS: f64 = 0.02;
/// Trust delta for an execution failure or timeout.
pub const TRUST_DELTA_FAILURE: f64 = -0.1;
/// Trust delta for a result rejected by verification.
pub const TRUST_DELTA_VERIFICATION_FAILURE: f64 = -0.3;

/// Initial trust for a peer we know nothing about.
pub const TRUST_BOOTSTRAP: f64 = 0.5;

/// Peers unreachable longer than this are excluded from scheduler
/// snapshots.
pub const LIVENESS_WINDOW_SECS: u64 = 120;

/// Peers unreachable longer than this are removed by the eviction sweep.
pub const EVICT_AFTER_SECS: u64 = 3600;

/// Smoothed link quality toward a peer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConnectionQuality {
    pub rtt_ms: f64,
    pub jitter_ms: f64,
    pub loss_frac: f64,
}

impl Default for ConnectionQuality {
    fn default() -> Self {
        Self {
            rtt_ms: 0.0,
            jitter_ms: 0.0,
            loss_frac: 0.0,
        }
    }
}

/// Compute capacity a peer last advertised.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeerCapacity {
    pub cpu_cores: u32,
    pub ram_mb: u64,
    /// Current load in [0, 1].
    pub load: f64,
}

impl Default for PeerCapacity {
    fn default() -> Self {
        Self {
            cpu_cores: 1,
            ram_mb: 1024,
            load: 0.0,
        }
    }
}

/// Everything the registry knows about one peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub id: PeerId,
    pub addr: String,
    pub quality: ConnectionQuality,
    pub capacity: PeerCapacity,
    /// Trust score in [0, 1], bootstrapped at 0.5.
    pub trust: f64,
    pub reachable: bool,
    /// Unix seconds of the last observation.
    pub last_seen_unix: u64,
    /// Unix seconds when the peer became unreachable, if it is.
    pub unreachable_since: Option<u64>,
}

/// Snapshot filter. The default keeps every reachable, live peer.
#[derive(Debug, Clone, Default)]
pub struct PeerFilter {
    /// Minimum trust score, if any.
    pub min_trust: Option<f64>,
    /// Maximum advertised load, if any.
    pub max_load: Option<f64>,
    /// Peers to exclude regardless of other criteria.
    pub exclude: Vec<PeerId>,
}

/// Registry of known peers. Many readers, one writer at a time; snapshots
/// return copies.
pub struct PeerRegistry {
    peers: RwLock<HashMap<PeerId, PeerRecord>>,
    time: Arc<dyn TimeProvider>,
    observer: Arc<dyn EventObserver>,
    liveness_window_secs: u64,
    evict_after_secs: u64,
}

impl PeerRegistry {
    pub fn new(time: Arc<dyn TimeProvider>) -> Self {
        Self::with_observer(time, Arc::new(NullObserver))
    }

    pub fn with_observer(time: Arc<dyn TimeProvider>, observer: Arc<dyn EventObserver>) -> Self {
        Self::with_windows(time, observer, LIVENESS_WINDOW_SECS, EVICT_AFTER_SECS)
    }

    /// Registry with custom liveness and eviction windows.
    pub fn with_windows(
        time: Arc<dyn TimeProvider>,
        observer: Arc<dyn EventObserver>,
        liveness_window_secs: u64,
        evict_after_secs: u64,
    ) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            time,
            observer,
            liveness_window_secs,
            evict_after_secs,
        }
    }

    /// Add a peer or refresh its last-seen timestamp and address.
    pub fn upsert_peer(&self, id: PeerId, addr: impl Into<String>) {
        let now = self.time.unix_seconds();
        let mut peers = self.peers.write().unwrap();
        let addr = addr.into();
        peers
            .entry(id.clone())
            .and_modify(|record| {
                if !addr.is_empty() {
                    record.addr = addr.clone();
                }
                record.last_seen_unix = now;
                record.reachable = true;
                record.unreachable_since = None;
            })
            .or_insert_with(|| {
                debug!("[PeerRegistry] New peer {id}");
                metrics::PEERS_ADDED.inc();
                PeerRecord {
                    id,
                    addr,
                    quality: ConnectionQuality::default(),
                    capacity: PeerCapacity::default(),
                    trust: TRUST_BOOTSTRAP,
                    reachable: true,
                    last_seen_unix: now,
                    unreachable_since: None,
                }
            });
    }

    /// Fold a fresh quality observation into the EWMA (α = 0.3).
    pub fn record_quality(&self, id: &PeerId, rtt_ms: f64, jitter_ms: f64, loss_frac: f64) {
        let now = self.time.unix_seconds();
        let mut peers = self.peers.write().unwrap();
        if let Some(record) = peers.get_mut(id) {
            let q = &mut record.quality;
            q.rtt_ms = ewma(q.rtt_ms, rtt_ms, record.last_seen_unix == 0);
            q.jitter_ms = ewma(q.jitter_ms, jitter_ms, false);
            q.loss_frac = ewma(q.loss_frac, loss_frac, false);
            record.last_seen_unix = now;
        }
    }

    /// Record the capacity a peer advertised.
    pub fn record_capacity(&self, id: &PeerId, capacity: PeerCapacity) {
        let mut peers = self.peers.write().unwrap();
        if let Some(record) = peers.get_mut(id) {
            record.capacity = capacity;
        }
    }

    /// Adjust a peer's trust score, clamped to [0, 1].
    pub fn record_trust(&self, id: &PeerId, delta: f64) {
        let mut peers = self.peers.write().unwrap();
        if let Some(record) = peers.get_mut(id) {
            record.trust = (record.trust + delta).clamp(0.0, 1.0);
            self.observer.on_event(&OrchestratorEvent::TrustAdjusted {
                peer: id.clone(),
                delta,
                score: record.trust,
            });
        }
    }

    pub fn mark_unreachable(&self, id: &PeerId) {
        let now = self.time.unix_seconds();
        let mut peers = self.peers.write().unwrap();
        if let Some(record) = peers.get_mut(id) {
            if record.reachable {
                record.reachable = false;
                record.unreachable_since = Some(now);
                info!("[PeerRegistry] Peer {id} marked unreachable");
                self.observer
                    .on_event(&OrchestratorEvent::PeerUnreachable { peer: id.clone() });
            }
        }
    }

    pub fn mark_reachable(&self, id: &PeerId) {
        let now = self.time.unix_seconds();
        let mut peers = self.peers.write().unwrap();
        if let Some(record) = peers.get_mut(id) {
            record.reachable = true;
            record.unreachable_since = None;
            record.last_seen_unix = now;
        }
    }

    pub fn connection_quality(&self, id: &PeerId) -> Option<ConnectionQuality> {
        self.peers.read().unwrap().get(id).map(|r| r.quality)
    }

    pub fn trust(&self, id: &PeerId) -> Option<f64> {
        self.peers.read().unwrap().get(id).map(|r| r.trust)
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().unwrap().is_empty()
    }

    /// Consistent snapshot of live peers matching `filter`, for the
    /// scheduler. Peers unreachable beyond the liveness window are always
    /// excluded.
    pub fn snapshot(&self, filter: &PeerFilter) -> Vec<PeerRecord> {
        let now = self.time.unix_seconds();
        let peers = self.peers.read().unwrap();
        let mut out: Vec<PeerRecord> = peers
            .values()
            .filter(|record| {
                if filter.exclude.contains(&record.id) {
                    return false;
                }
                if !record.reachable {
                    // Peers inside the grace window stay visible (they may
                    // flap back); beyond it they are withheld entirely.
                    let gone_for = record
                        .unreachable_since
                        .map(|t| now.saturating_sub(t))
                        .unwrap_or(u64::MAX);
                    if gone_for > self.liveness_window_secs {
                        return false;
                    }
                }
                if let Some(min_trust) = filter.min_trust {
                    if record.trust < min_trust {
                        return false;
                    }
                }
                if let Some(max_load) = filter.max_load {
                    if record.capacity.load >= max_load {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Remove peers unreachable for longer than the eviction window
    /// (1 hour by default). Driven periodically (every 5 minutes) by the
    /// embedder. Returns the removed ids.
    pub fn evict_stale(&self) -> Vec<PeerId> {
        let now = self.time.unix_seconds();
        let mut peers = self.peers.write().unwrap();
        let stale: Vec<PeerId> = peers
            .values()
            .filter(|r| {
                !r.reachable
                    && r.unreachable_since
                        .map(|t| now.saturating_sub(t) > self.evict_after_secs)
                        .unwrap_or(false)
            })
            .map(|r| r.id.clone())
            .collect();
        for id in &stale {
            peers.remove(id);
            info!("[PeerRegistry] Evicted stale peer {id}");
            metrics::PEERS_EVICTED.inc();
        }
        stale
    }
}

fn ewma(previous: f64, observation: f64, first: bool) -> f64 {
    if first || previous == 0.0 {
        observation
    } else {
        QUALITY_EWMA_ALPHA * observation + (1.0 - QUALITY_EWMA_ALPHA) * previous
    }
}
