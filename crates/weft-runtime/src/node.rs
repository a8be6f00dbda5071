//! Node assembly.
//!
//! Wires the capability probe, peer registry, shard cache, sandbox pool,
//! and job manager together over a supplied transport, registers the
//! delegation handler, and optionally drives the periodic maintenance
//! sweep.

use crate::config::SystemConfig;
use crate::context::NodeContext;
use crate::delegation::DelegationService;
use crate::job::{JobStatus, ResultFetch};
use crate::manager::JobManager;
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use weft_cache::{DirManifestStore, ManifestStore, ShardCache};
use weft_common::{
    CapabilityProbe, CommonError, EventObserver, JobId, NullObserver, PeerId, SystemTimeProvider,
    TimeProvider,
};
use weft_network::{Discovery, Transport};
use weft_peers::{PeerCapacity, PeerRegistry};
use weft_protocol::JobManifest;
use weft_sandbox::{ExecutorPool, Sandbox};

/// One Weft peer: simultaneously a potential manager and a potential
/// worker. Must be created inside a tokio runtime.
pub struct MeshNode {
    pub ctx: Arc<NodeContext>,
    pub manager: Arc<JobManager>,
}

impl MeshNode {
    /// Assemble a node over the given transport and sandbox backend.
    pub fn new(
        local_id: PeerId,
        config: SystemConfig,
        transport: Arc<dyn Transport>,
        sandbox: Arc<dyn Sandbox>,
    ) -> Result<Arc<Self>, CommonError> {
        Self::with_observer(local_id, config, transport, sandbox, Arc::new(NullObserver))
    }

    pub fn with_observer(
        local_id: PeerId,
        config: SystemConfig,
        transport: Arc<dyn Transport>,
        sandbox: Arc<dyn Sandbox>,
        observer: Arc<dyn EventObserver>,
    ) -> Result<Arc<Self>, CommonError> {
        let time: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
        let probe = Arc::new(CapabilityProbe::new());
        let registry = Arc::new(PeerRegistry::with_windows(
            Arc::clone(&time),
            Arc::clone(&observer),
            config.liveness_window_secs,
            config.peer_evict_after_secs,
        ));
        let store: Arc<dyn ManifestStore> = Arc::new(DirManifestStore::new(&config.cache_dir)?);
        let cache = Arc::new(ShardCache::with_observer(
            config.cache_max_bytes,
            store,
            Arc::clone(&observer),
        ));
        let workers = probe.probe().cpu_cores as usize;
        let pool = ExecutorPool::new(
            Arc::clone(&sandbox),
            workers,
            config.executor_queue_cap,
            config.fail_fast_under_load,
        );

        let ctx = NodeContext::new(
            local_id,
            config,
            probe,
            registry,
            cache,
            sandbox,
            pool,
            Arc::clone(&transport),
            observer,
            time,
        );
        let manager = JobManager::new(Arc::clone(&ctx));
        let service = DelegationService::new(Arc::clone(&ctx), Arc::clone(&manager));
        transport.set_handler(service);

        Ok(Arc::new(Self { ctx, manager }))
    }

    // --- External RPC surface ---

    pub fn submit_job(&self, manifest: JobManifest) -> Result<JobId, CommonError> {
        self.manager.submit_job(manifest)
    }

    pub fn get_status(&self, job_id: JobId) -> Result<JobStatus, CommonError> {
        self.manager.get_status(job_id)
    }

    pub async fn get_result(&self, job_id: JobId, wait_ms: u64) -> Result<ResultFetch, CommonError> {
        self.manager.get_result(job_id, wait_ms).await
    }

    pub fn cancel_job(&self, job_id: JobId) -> Result<(), CommonError> {
        self.manager.cancel_job(job_id)
    }

    // --- Mesh membership ---

    /// Seed the registry from a discovery source and advertise this node.
    pub fn bootstrap_peers(&self, discovery: &dyn Discovery, service_name: &str) {
        discovery.announce(service_name);
        for (id, addr) in discovery.discovered_peers(service_name) {
            if id != self.ctx.local_id {
                self.ctx.registry.upsert_peer(id, addr);
            }
        }
    }

    /// Record a capacity advertisement from a peer (heartbeat path).
    pub fn observe_peer_capacity(&self, id: &PeerId, capacity: PeerCapacity) {
        self.ctx.registry.record_capacity(id, capacity);
    }

    /// Spawn the periodic maintenance sweep: stale-peer eviction, expired
    /// manifest removal, and terminal-job pruning.
    pub fn start_maintenance(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            let interval = Duration::from_secs(node.ctx.config.sweep_interval_secs.max(1));
            loop {
                tokio::time::sleep(interval).await;
                let evicted = node.ctx.registry.evict_stale();
                if !evicted.is_empty() {
                    debug!("[MeshNode] Swept {} stale peer(s)", evicted.len());
                }
                let now = node.ctx.time.unix_seconds();
                if let Err(e) = node.ctx.cache.remove_expired_manifests(now) {
                    debug!("[MeshNode] Manifest sweep failed: {e}");
                }
                let ttl = node.ctx.config.peer_evict_after_secs;
                node.manager.prune_finished(ttl);
            }
        })
    }
}
