//! Worker-side delegation handling.
//!
//! One handler serves the whole node. Inbound chunks are acknowledged
//! immediately and processed asynchronously: the peer re-scores the chunk
//! against its own capacity and either executes locally or, with depth to
//! spare, runs the manager path again one level down. Results return to
//! the delegating peer as `ReturnTaskResult` messages.

use crate::context::NodeContext;
use crate::manager::JobManager;
use crate::metrics;
use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use weft_common::{JobId, PeerId};
use weft_mesh::{complexity_score, decide_locus, select_workers, ExecutionLocus};
use weft_network::{MessageHandler, TransportError};
use weft_peers::{PeerFilter, TRUST_DELTA_VERIFICATION_FAILURE};
use weft_protocol::{
    DelegationAck, DelegationRequest, LocalityPreference, MessagePayload, ModuleResponse,
    ResultAck, TaskResultMessage, TaskStatus, WireMessage,
};
use weft_sandbox::{CancelToken, EntryPoint, ExecutionLimits, LimitKind, PoolPriority, SandboxError};
use weft_verify::{attest_result, verify_result};

struct ServiceInner {
    ctx: Arc<NodeContext>,
    manager: Arc<JobManager>,
    /// Chunks relayed one level down, awaiting the sub-worker's result.
    relays: DashMap<(JobId, u32, u32), oneshot::Sender<TaskResultMessage>>,
    /// Cancellation tokens for jobs whose chunks run here on behalf of
    /// remote managers.
    tokens: DashMap<JobId, CancelToken>,
}

/// Handler for all inbound delegation traffic.
pub struct DelegationService {
    inner: Arc<ServiceInner>,
}

impl DelegationService {
    pub fn new(ctx: Arc<NodeContext>, manager: Arc<JobManager>) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(ServiceInner {
                ctx,
                manager,
                relays: DashMap::new(),
                tokens: DashMap::new(),
            }),
        })
    }
}

impl ServiceInner {
    fn token_for(&self, job_id: JobId) -> CancelToken {
        self.tokens
            .entry(job_id)
            .or_insert_with(CancelToken::new)
            .clone()
    }

    /// Process one delegated chunk and report back to `manager_peer`.
    async fn process_delegation(&self, manager_peer: PeerId, request: DelegationRequest) {
        let token = self.token_for(request.job_id);
        metrics::DELEGATED_CHUNKS_SERVED.inc();

        let result = self
            .execute_delegated(&manager_peer, &request, token.clone())
            .await;

        if token.is_cancelled() {
            // The manager aborted; nothing further goes upstream.
            debug!(
                "[DelegationService] Suppressing result for aborted job {}",
                request.job_id
            );
            return;
        }
        let message = WireMessage::new(
            MessagePayload::ReturnTaskResult(result),
            self.ctx.local_id.clone(),
        );
        if let Err(e) = self.ctx.transport.send(&manager_peer, message).await {
            warn!(
                "[DelegationService] Could not return result for job {} chunk {} to {manager_peer}: {e}",
                request.job_id, request.chunk_index
            );
        }
    }

    async fn execute_delegated(
        &self,
        manager_peer: &PeerId,
        request: &DelegationRequest,
        token: CancelToken,
    ) -> TaskResultMessage {
        let module = match self
            .ctx
            .resolve_module(&request.module_hash, manager_peer)
            .await
        {
            Ok(module) => module,
            Err(e) => {
                return self.failure(request, TaskStatus::Failed, format!("module fetch: {e}"))
            }
        };

        // The recursive decision: this peer may itself act as a manager
        // for the chunk, one level deeper in the tree.
        let capacity = self.ctx.probe.probe();
        let score = complexity_score(
            request.chunk_bytes.len(),
            module.len(),
            &capacity,
            self.ctx.config.baseline_ram_mb,
        );
        let max_depth = request
            .max_delegation_depth
            .min(self.ctx.config.max_delegation_depth);
        let snapshot = self.ctx.registry.snapshot(&PeerFilter::default());
        let healthy = snapshot.iter().filter(|r| r.reachable).count();
        let locus = decide_locus(
            score,
            self.ctx.config.delegation_threshold,
            LocalityPreference::Indifferent,
            healthy,
            request.current_depth,
            max_depth,
        );

        if locus == ExecutionLocus::Delegate {
            let exclude: HashSet<PeerId> = [manager_peer.clone()].into_iter().collect();
            if let Some(worker) = select_workers(&snapshot, 1, &exclude).into_iter().next() {
                info!(
                    "[DelegationService] Re-delegating job {} chunk {} to {worker} at depth {}",
                    request.job_id,
                    request.chunk_index,
                    request.current_depth + 1
                );
                if let Some(result) = self.relay(request, &worker).await {
                    return result;
                }
                // Fall through to local execution when the relay fails.
            }
        }

        self.execute_local(request, &module, token).await
    }

    /// Run the chunk through the next peer down, awaiting its returned
    /// result. `None` means the relay failed and the chunk should run
    /// locally instead.
    async fn relay(
        &self,
        request: &DelegationRequest,
        worker: &PeerId,
    ) -> Option<TaskResultMessage> {
        let relay_key = (request.job_id, request.chunk_index, request.attempt);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.relays.insert(relay_key, reply_tx);

        let sub_request = DelegationRequest {
            current_depth: request.current_depth + 1,
            ..request.clone()
        };
        let message = WireMessage::new(
            MessagePayload::DelegateTask(sub_request),
            self.ctx.local_id.clone(),
        );

        let accepted = match self.ctx.transport.send(worker, message).await {
            Ok(response) => matches!(
                response.payload,
                MessagePayload::DelegateAck(DelegationAck { accepted: true, .. })
            ),
            Err(e) => {
                debug!("[DelegationService] Relay to {worker} failed: {e}");
                self.ctx.registry.mark_unreachable(worker);
                false
            }
        };
        if !accepted {
            self.relays.remove(&relay_key);
            return None;
        }

        let wait = Duration::from_millis(request.timeout_ms);
        let sub_result = match tokio::time::timeout(wait, reply_rx).await {
            Ok(Ok(result)) => result,
            _ => {
                self.relays.remove(&relay_key);
                debug!(
                    "[DelegationService] Relay of job {} chunk {} timed out",
                    request.job_id, request.chunk_index
                );
                return None;
            }
        };

        // A manager verifies what it forwards; a bad sub-result costs the
        // sub-worker trust here and the chunk runs locally instead.
        if sub_result.status == TaskStatus::Ok {
            if let Err(e) = verify_result(request.verification, &sub_result) {
                warn!(
                    "[DelegationService] Sub-worker {} returned an unverifiable result: {e}",
                    sub_result.worker
                );
                self.ctx
                    .registry
                    .record_trust(&sub_result.worker, TRUST_DELTA_VERIFICATION_FAILURE);
                return None;
            }
        }

        // Relabel: this node is accountable to its own manager.
        Some(TaskResultMessage {
            worker: self.ctx.local_id.clone(),
            ..sub_result
        })
    }

    async fn execute_local(
        &self,
        request: &DelegationRequest,
        module: &Arc<Vec<u8>>,
        token: CancelToken,
    ) -> TaskResultMessage {
        let limits = ExecutionLimits {
            max_wall_ms: request.timeout_ms,
            max_cpu_ms: request.timeout_ms,
            max_memory_mb: self.ctx.config.chunk_memory_limit_mb,
        };
        let outcome = self
            .ctx
            .pool
            .execute(
                Arc::clone(module),
                EntryPoint::Run,
                request.chunk_bytes.clone(),
                limits,
                token,
                PoolPriority::Normal,
            )
            .await;
        match outcome {
            Ok(outcome) => {
                let attestation = attest_result(request.verification, &outcome.output);
                TaskResultMessage {
                    job_id: request.job_id,
                    chunk_index: request.chunk_index,
                    worker: self.ctx.local_id.clone(),
                    attempt: request.attempt,
                    payload: Some(outcome.output),
                    result_hash: attestation.result_hash,
                    merkle_proof: attestation.merkle_proof,
                    duration_ms: outcome.metrics.wall_ms,
                    status: TaskStatus::Ok,
                    error: None,
                }
            }
            Err(SandboxError::LimitExceeded(LimitKind::Wall)) => {
                self.failure(request, TaskStatus::Timeout, "wall limit exceeded".to_string())
            }
            Err(e) => self.failure(request, TaskStatus::Failed, e.to_string()),
        }
    }

    fn failure(
        &self,
        request: &DelegationRequest,
        status: TaskStatus,
        error: String,
    ) -> TaskResultMessage {
        TaskResultMessage {
            job_id: request.job_id,
            chunk_index: request.chunk_index,
            worker: self.ctx.local_id.clone(),
            attempt: request.attempt,
            payload: None,
            result_hash: None,
            merkle_proof: None,
            duration_ms: 0,
            status,
            error: Some(error),
        }
    }

    fn ack(&self, payload: MessagePayload) -> WireMessage {
        WireMessage::new(payload, self.ctx.local_id.clone())
    }
}

#[async_trait]
impl MessageHandler for DelegationService {
    async fn handle(
        &self,
        from: PeerId,
        message: WireMessage,
    ) -> Result<WireMessage, TransportError> {
        let inner = &self.inner;
        // Every inbound message refreshes the sender's liveness.
        inner.ctx.registry.upsert_peer(from.clone(), "");

        match message.payload {
            MessagePayload::DelegateTask(request) => {
                let est_ms = (request.chunk_bytes.len() / 1024) as u32 + 10;
                let task_inner = Arc::clone(inner);
                tokio::spawn(async move {
                    task_inner.process_delegation(from, request).await;
                });
                Ok(inner.ack(MessagePayload::DelegateAck(DelegationAck {
                    accepted: true,
                    est_ms,
                })))
            }
            MessagePayload::ReturnTaskResult(result) => {
                let accepted = if inner.manager.route_result(result.clone()) {
                    true
                } else {
                    let relay_key = (result.job_id, result.chunk_index, result.attempt);
                    match inner.relays.remove(&relay_key) {
                        Some((_, reply)) => reply.send(result).is_ok(),
                        None => false,
                    }
                };
                Ok(inner.ack(MessagePayload::ResultAck(ResultAck { accepted })))
            }
            MessagePayload::ProvideModule(request) => {
                let module_bytes = inner.ctx.module(&request.module_hash).map(|m| m.to_vec());
                Ok(inner.ack(MessagePayload::ModuleData(ModuleResponse {
                    module_hash: request.module_hash,
                    module_bytes,
                })))
            }
            MessagePayload::AbortJob(request) => {
                info!(
                    "[DelegationService] Abort for job {} from {from}",
                    request.job_id
                );
                if let Some(token) = inner.tokens.get(&request.job_id) {
                    token.cancel();
                }
                // Drop any pending relays so late sub-results are ignored.
                inner.relays.retain(|key, _| key.0 != request.job_id);
                Ok(inner.ack(MessagePayload::ResultAck(ResultAck { accepted: true })))
            }
            other => Err(TransportError::UnsupportedMessage {
                message_type: other.message_type(),
            }),
        }
    }
}
