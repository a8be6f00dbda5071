//! Shared node context.
//!
//! All services a node's components need, wired once at startup and
//! handed around as an `Arc`. There is no global state: observers,
//! configuration, and collaborators are explicit constructor parameters.

use crate::config::SystemConfig;
use crate::error::MeshJobError;
use dashmap::DashMap;
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use weft_cache::ShardCache;
use weft_common::{
    retry::with_backoff, CapabilityProbe, ContentHash, EventObserver, PeerId, TimeProvider,
};
use weft_network::Transport;
use weft_peers::PeerRegistry;
use weft_protocol::{MessagePayload, ModuleRequest, WireMessage};
use weft_sandbox::{ExecutorPool, Sandbox};

/// Attempts made to pull a module from the delegating peer before the
/// chunk is given up as unservable.
const MODULE_FETCH_ATTEMPTS: u32 = 3;

/// Initial backoff wait between module fetch attempts.
const MODULE_FETCH_BACKOFF: Duration = Duration::from_millis(50);

/// Backoff ceiling between module fetch attempts.
const MODULE_FETCH_BACKOFF_CAP: Duration = Duration::from_millis(400);

/// Everything a node's job machinery shares.
pub struct NodeContext {
    pub local_id: PeerId,
    pub config: SystemConfig,
    pub probe: Arc<CapabilityProbe>,
    pub registry: Arc<PeerRegistry>,
    pub cache: Arc<ShardCache>,
    pub sandbox: Arc<dyn Sandbox>,
    pub pool: Arc<ExecutorPool>,
    pub transport: Arc<dyn Transport>,
    pub observer: Arc<dyn EventObserver>,
    pub time: Arc<dyn TimeProvider>,
    /// Content-addressed module cache: write-once, read-many.
    modules: DashMap<ContentHash, Arc<Vec<u8>>>,
}

impl NodeContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local_id: PeerId,
        config: SystemConfig,
        probe: Arc<CapabilityProbe>,
        registry: Arc<PeerRegistry>,
        cache: Arc<ShardCache>,
        sandbox: Arc<dyn Sandbox>,
        pool: Arc<ExecutorPool>,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn EventObserver>,
        time: Arc<dyn TimeProvider>,
    ) -> Arc<Self> {
        Arc::new(Self {
            local_id,
            config,
            probe,
            registry,
            cache,
            sandbox,
            pool,
            transport,
            observer,
            time,
            modules: DashMap::new(),
        })
    }

    /// Store module bytes under their content hash. Idempotent: modules
    /// are immutable once written.
    pub fn store_module(&self, bytes: Vec<u8>) -> ContentHash {
        let hash = ContentHash::from_bytes(&bytes);
        self.modules.entry(hash).or_insert_with(|| Arc::new(bytes));
        hash
    }

    /// Look up module bytes by hash.
    pub fn module(&self, hash: &ContentHash) -> Option<Arc<Vec<u8>>> {
        self.modules.get(hash).map(|entry| Arc::clone(entry.value()))
    }

    /// Resolve a module: locally if cached, otherwise pulled from `from`
    /// by hash and cached for the next request. The pull is retried with
    /// backoff; churn around a delegating peer is usually momentary.
    pub async fn resolve_module(
        &self,
        hash: &ContentHash,
        from: &PeerId,
    ) -> Result<Arc<Vec<u8>>, MeshJobError> {
        if let Some(module) = self.module(hash) {
            return Ok(module);
        }
        debug!("[NodeContext] Pulling module {hash} from {from}");
        let request = WireMessage::new(
            MessagePayload::ProvideModule(ModuleRequest { module_hash: *hash }),
            self.local_id.clone(),
        );
        let response = with_backoff(
            || self.transport.send(from, request.clone()),
            MODULE_FETCH_ATTEMPTS,
            MODULE_FETCH_BACKOFF,
            MODULE_FETCH_BACKOFF_CAP,
        )
        .await?;
        match response.payload {
            MessagePayload::ModuleData(data) => match data.module_bytes {
                Some(bytes) if ContentHash::from_bytes(&bytes) == *hash => {
                    self.store_module(bytes.clone());
                    Ok(Arc::new(bytes))
                }
                Some(_) => Err(MeshJobError::ModuleUnavailable {
                    module_hash: format!("{hash} (hash mismatch from {from})"),
                }),
                None => Err(MeshJobError::ModuleUnavailable {
                    module_hash: hash.to_string(),
                }),
            },
            other => Err(MeshJobError::Internal(format!(
                "unexpected response to module request: {}",
                other.message_type()
            ))),
        }
    }
}
