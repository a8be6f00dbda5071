//! Per-job coordinator.
//!
//! One task owns all state for one job and serializes its transitions:
//! split, dispatch, collection, verification, merge. Dispatch helpers and
//! remote workers talk to it exclusively through its message channel, so
//! no two transitions ever race.

use crate::context::NodeContext;
use crate::job::{FailureInfo, FailureKind, Job, JobOutcome, JobState, JobStatus};
use crate::metrics;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use weft_cache::ShardKey;
use weft_common::{OrchestratorEvent, PeerId};
use weft_mesh::{
    complexity_score, decide_locus, select_workers, AssignmentArena, AssignmentKey,
    ExecutionLocus, TaskAssignment,
};
use weft_peers::{PeerFilter, TRUST_DELTA_FAILURE, TRUST_DELTA_SUCCESS, TRUST_DELTA_VERIFICATION_FAILURE};
use weft_protocol::{
    split::split_input, DelegationRequest, MessagePayload, Priority, TaskResultMessage,
    TaskStatus, WireMessage,
};
use weft_sandbox::{
    encode_merge_input, CancelToken, EntryPoint, ExecutionLimits, PoolPriority, SandboxError,
};
use weft_verify::{attest_result, resolve_redundant, verify_result, QuorumOutcome, VerifyError};

/// How often the coordinator checks assignment deadlines.
const DEADLINE_TICK: Duration = Duration::from_millis(25);

/// How the merge phase ended short of success.
enum MergeEnd {
    Cancelled,
    Failed(String),
}

/// Messages a coordinator accepts.
#[derive(Debug)]
pub(crate) enum CoordinatorMsg {
    /// A task result arrived (remote or local; both use the same path).
    Result(TaskResultMessage),
    /// Cancel the job.
    Cancel,
}

enum ChunkPhase {
    InFlight {
        attempt: u32,
        expected: usize,
        ok_results: Vec<(PeerId, Vec<u8>)>,
        failures: usize,
    },
    Done,
    Failed,
}

struct ChunkSlot {
    bytes: Arc<Vec<u8>>,
    phase: ChunkPhase,
    retries_left: u32,
    next_attempt: u32,
    /// Workers that ever held a copy, for disjoint re-dispatch.
    tried: HashSet<PeerId>,
    output: Option<Vec<u8>>,
}

pub(crate) struct JobCoordinator {
    ctx: Arc<NodeContext>,
    job: Job,
    module: Arc<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<CoordinatorMsg>,
    /// Handed to dispatch tasks so results funnel back here.
    tx: mpsc::UnboundedSender<CoordinatorMsg>,
    status_tx: watch::Sender<JobStatus>,
    done_tx: watch::Sender<Option<JobOutcome>>,
    /// Node-wide outstanding chunk counter, for admission backpressure.
    outstanding: Arc<AtomicUsize>,
    chunks: Vec<ChunkSlot>,
    arena: AssignmentArena,
    /// Exactly-once filter over `(chunk, worker, attempt)`.
    processed: HashSet<(u32, PeerId, u32)>,
    /// Job-wide cancellation token for local sandbox runs.
    cancel: CancelToken,
    /// Chunks not yet terminal; backs the outstanding counter.
    unfinished: usize,
    started_ms: u64,
    cancelled: bool,
}

impl JobCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        ctx: Arc<NodeContext>,
        job: Job,
        module: Arc<Vec<u8>>,
        rx: mpsc::UnboundedReceiver<CoordinatorMsg>,
        tx: mpsc::UnboundedSender<CoordinatorMsg>,
        status_tx: watch::Sender<JobStatus>,
        done_tx: watch::Sender<Option<JobOutcome>>,
        outstanding: Arc<AtomicUsize>,
    ) -> Self {
        let started_ms = ctx.time.unix_millis();
        Self {
            ctx,
            job,
            module,
            rx,
            tx,
            status_tx,
            done_tx,
            outstanding,
            chunks: Vec::new(),
            arena: AssignmentArena::new(),
            processed: HashSet::new(),
            cancel: CancelToken::new(),
            unfinished: 0,
            started_ms,
            cancelled: false,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("[JobCoordinator] Job {} admitted", self.job.id);
        self.set_state(JobState::Splitting);

        let chunks = match split_input(self.job.id, &self.job.manifest.input, &self.job.manifest.config)
        {
            Ok(chunks) => chunks,
            Err(e) => {
                self.finish_failed(FailureInfo {
                    kind: FailureKind::BadManifest,
                    detail: e.to_string(),
                    failed_chunks: vec![],
                });
                return;
            }
        };
        let retry_budget = self.job.manifest.config.retry_budget;
        self.chunks = chunks
            .into_iter()
            .map(|c| ChunkSlot {
                bytes: Arc::new(c.bytes),
                phase: ChunkPhase::InFlight {
                    attempt: 0,
                    expected: 0,
                    ok_results: Vec::new(),
                    failures: 0,
                },
                retries_left: retry_budget,
                next_attempt: 0,
                tried: HashSet::new(),
                output: None,
            })
            .collect();
        self.unfinished = self.chunks.len();
        self.outstanding.fetch_add(self.unfinished, Ordering::SeqCst);
        debug!(
            "[JobCoordinator] Job {} split into {} chunk(s)",
            self.job.id,
            self.chunks.len()
        );
        self.push_status();

        self.set_state(JobState::Dispatching);
        for index in 0..self.chunks.len() as u32 {
            self.dispatch_chunk(index);
        }
        self.set_state(JobState::Collecting);

        let mut ticker = tokio::time::interval(DEADLINE_TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            if let Some(failed) = self.failed_chunks() {
                self.abort_in_flight();
                self.finish_failed(FailureInfo {
                    kind: FailureKind::ChunkRetriesExhausted,
                    detail: format!("{} chunk(s) exhausted their retry budget", failed.len()),
                    failed_chunks: failed,
                });
                return;
            }
            if self.all_done() {
                break;
            }
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(CoordinatorMsg::Result(result)) => self.handle_result(result),
                    Some(CoordinatorMsg::Cancel) => {
                        self.handle_cancel();
                        return;
                    }
                    None => return,
                },
                _ = ticker.tick() => self.handle_deadlines(),
            }
        }

        self.set_state(JobState::Merging);
        match self.merge().await {
            Ok(output) => {
                let output = Arc::new(output);
                if let Err(e) = self
                    .ctx
                    .cache
                    .put_shard(ShardKey::Output { job_id: self.job.id }, output.to_vec())
                {
                    warn!(
                        "[JobCoordinator] Could not cache output of job {}: {e}",
                        self.job.id
                    );
                }
                let _ = self.done_tx.send(Some(Ok(output)));
                self.set_state(JobState::Finalized);
                metrics::JOBS_FINALIZED.inc();
                info!("[JobCoordinator] Job {} finalized", self.job.id);
            }
            Err(MergeEnd::Cancelled) => {
                self.handle_cancel();
            }
            Err(MergeEnd::Failed(detail)) => {
                self.finish_failed(FailureInfo {
                    kind: FailureKind::MergeFailed,
                    detail,
                    failed_chunks: vec![],
                });
            }
        }
    }

    // --- Dispatch ---

    /// Decide the execution locus for one chunk and send it on its way.
    fn dispatch_chunk(&mut self, index: u32) {
        let config = self.job.manifest.config.clone();
        let slot = &self.chunks[index as usize];
        let bytes = Arc::clone(&slot.bytes);
        let tried = slot.tried.clone();
        let attempt = slot.next_attempt;

        let capacity = self.ctx.probe.probe();
        let score = complexity_score(
            bytes.len(),
            self.module.len(),
            &capacity,
            self.ctx.config.baseline_ram_mb,
        );
        let snapshot = self.ctx.registry.snapshot(&PeerFilter::default());
        let healthy = snapshot.iter().filter(|r| r.reachable).count();
        let max_depth = config.max_delegation_depth.min(self.ctx.config.max_delegation_depth);
        let locus = decide_locus(
            score,
            self.ctx.config.delegation_threshold,
            config.locality,
            healthy,
            0,
            max_depth,
        );

        let mut workers = match locus {
            ExecutionLocus::Delegate => {
                let selected = select_workers(&snapshot, config.redundancy as usize, &tried);
                // Local fallback: a delegation decision with no eligible
                // peer runs here regardless of score.
                if selected.is_empty() {
                    weft_mesh::metrics::LOCAL_FALLBACKS.inc();
                }
                selected
            }
            ExecutionLocus::Local => Vec::new(),
        };
        if workers.is_empty() {
            workers.push(self.ctx.local_id.clone());
        } else if (workers.len() as u32) < config.redundancy
            && !tried.contains(&self.ctx.local_id)
        {
            // A redundancy shortfall borrows the local node for one copy.
            workers.push(self.ctx.local_id.clone());
        }

        let deadline = self.ctx.time.unix_millis() + config.chunk_timeout_ms;
        let key = AssignmentKey {
            job_id: self.job.id,
            chunk_index: index,
            attempt,
        };
        self.arena
            .insert(TaskAssignment::new(key, workers.clone(), deadline));

        {
            let slot = &mut self.chunks[index as usize];
            slot.phase = ChunkPhase::InFlight {
                attempt,
                expected: workers.len(),
                ok_results: Vec::new(),
                failures: 0,
            };
            slot.next_attempt += 1;
            slot.tried.extend(workers.iter().cloned());
        }

        for worker in workers {
            self.ctx.observer.on_event(&OrchestratorEvent::ChunkDispatched {
                job_id: self.job.id,
                chunk_index: index,
                worker: worker.clone(),
                attempt,
            });
            if worker == self.ctx.local_id {
                self.spawn_local(index, attempt, Arc::clone(&bytes));
            } else {
                self.spawn_remote(worker, index, attempt, Arc::clone(&bytes), max_depth);
            }
        }
    }

    fn spawn_local(&self, index: u32, attempt: u32, bytes: Arc<Vec<u8>>) {
        let ctx = Arc::clone(&self.ctx);
        let tx = self.tx.clone();
        let module = Arc::clone(&self.module);
        let config = self.job.manifest.config.clone();
        let job_id = self.job.id;
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let limits = ExecutionLimits {
                max_wall_ms: config.chunk_timeout_ms,
                max_cpu_ms: config.chunk_timeout_ms,
                max_memory_mb: ctx.config.chunk_memory_limit_mb,
            };
            let outcome = ctx
                .pool
                .execute(
                    module,
                    EntryPoint::Run,
                    bytes.to_vec(),
                    limits,
                    cancel,
                    pool_priority(config.priority),
                )
                .await;
            let result = match outcome {
                Ok(outcome) => {
                    let attestation = attest_result(config.verification, &outcome.output);
                    TaskResultMessage {
                        job_id,
                        chunk_index: index,
                        worker: ctx.local_id.clone(),
                        attempt,
                        payload: Some(outcome.output),
                        result_hash: attestation.result_hash,
                        merkle_proof: attestation.merkle_proof,
                        duration_ms: outcome.metrics.wall_ms,
                        status: TaskStatus::Ok,
                        error: None,
                    }
                }
                Err(e) => failure_result(
                    job_id,
                    index,
                    ctx.local_id.clone(),
                    attempt,
                    status_for_sandbox_error(&e),
                    e.to_string(),
                ),
            };
            let _ = tx.send(CoordinatorMsg::Result(result));
        });
    }

    fn spawn_remote(
        &self,
        worker: PeerId,
        index: u32,
        attempt: u32,
        bytes: Arc<Vec<u8>>,
        max_depth: u32,
    ) {
        let ctx = Arc::clone(&self.ctx);
        let tx = self.tx.clone();
        let config = self.job.manifest.config.clone();
        let job_id = self.job.id;
        let module_hash = self.job.manifest.module_hash;
        tokio::spawn(async move {
            let request = DelegationRequest {
                job_id,
                chunk_index: index,
                attempt,
                module_hash,
                chunk_bytes: bytes.to_vec(),
                // The receiving peer executes one edge below us.
                current_depth: 1,
                timeout_ms: config.chunk_timeout_ms,
                verification: config.verification,
                max_delegation_depth: max_depth,
            };
            let message = WireMessage::new(
                MessagePayload::DelegateTask(request),
                ctx.local_id.clone(),
            );
            let started = std::time::Instant::now();
            match ctx.transport.send(&worker, message).await {
                Ok(response) => {
                    let rtt = started.elapsed().as_millis() as f64;
                    ctx.registry.record_quality(&worker, rtt, 0.0, 0.0);
                    match response.payload {
                        MessagePayload::DelegateAck(ack) if ack.accepted => {
                            // The result arrives later as ReturnTaskResult.
                        }
                        _ => {
                            let _ = tx.send(CoordinatorMsg::Result(failure_result(
                                job_id,
                                index,
                                worker,
                                attempt,
                                TaskStatus::Failed,
                                "delegation rejected".to_string(),
                            )));
                        }
                    }
                }
                Err(e) => {
                    ctx.registry.mark_unreachable(&worker);
                    let _ = tx.send(CoordinatorMsg::Result(failure_result(
                        job_id,
                        index,
                        worker,
                        attempt,
                        TaskStatus::Failed,
                        format!("peer unreachable: {e}"),
                    )));
                }
            }
        });
    }

    // --- Collection ---

    fn handle_result(&mut self, result: TaskResultMessage) {
        // Exactly-once per (chunk, worker, attempt); duplicates are
        // discarded idempotently.
        if !self
            .processed
            .insert((result.chunk_index, result.worker.clone(), result.attempt))
        {
            return;
        }
        let index = result.chunk_index as usize;
        if index >= self.chunks.len() {
            return;
        }
        let current_attempt = match &self.chunks[index].phase {
            ChunkPhase::InFlight { attempt, .. } if *attempt == result.attempt => *attempt,
            // Stale attempt or already-terminal chunk.
            _ => return,
        };
        let key = AssignmentKey {
            job_id: self.job.id,
            chunk_index: result.chunk_index,
            attempt: current_attempt,
        };
        // Only workers the attempt was actually dispatched to may answer;
        // anything else (including results racing a deadline) is dropped.
        if !self.arena.mark_responded(&key, &result.worker) {
            return;
        }

        let remote = result.worker != self.ctx.local_id;
        let verification = self.job.manifest.config.verification;
        match verify_result(verification, &result) {
            Ok(()) => {
                if let ChunkPhase::InFlight { ok_results, .. } = &mut self.chunks[index].phase {
                    ok_results.push((
                        result.worker.clone(),
                        result.payload.unwrap_or_default(),
                    ));
                }
            }
            Err(VerifyError::NotOk) => {
                // The worker reported failure or timeout; not an
                // integrity violation.
                if remote {
                    self.ctx
                        .registry
                        .record_trust(&result.worker, TRUST_DELTA_FAILURE);
                }
                if let ChunkPhase::InFlight { failures, .. } = &mut self.chunks[index].phase {
                    *failures += 1;
                }
            }
            Err(e) => {
                debug!(
                    "[JobCoordinator] Rejecting result for job {} chunk {} from {}: {e}",
                    self.job.id, result.chunk_index, result.worker
                );
                self.ctx
                    .observer
                    .on_event(&OrchestratorEvent::VerificationRejected {
                        job_id: self.job.id,
                        chunk_index: result.chunk_index,
                        worker: result.worker.clone(),
                    });
                if remote {
                    self.ctx
                        .registry
                        .record_trust(&result.worker, TRUST_DELTA_VERIFICATION_FAILURE);
                }
                if let ChunkPhase::InFlight { failures, .. } = &mut self.chunks[index].phase {
                    *failures += 1;
                }
            }
        }

        let complete = match &self.chunks[index].phase {
            ChunkPhase::InFlight {
                expected,
                ok_results,
                failures,
                ..
            } => ok_results.len() + failures >= *expected,
            _ => false,
        };
        if complete {
            self.arena.remove(&key);
            self.resolve_chunk(index);
        }
    }

    /// All group members answered (or the deadline fired): settle the
    /// chunk from the verified results at hand.
    fn resolve_chunk(&mut self, index: usize) {
        let ok_results = match &mut self.chunks[index].phase {
            ChunkPhase::InFlight { ok_results, .. } => std::mem::take(ok_results),
            _ => return,
        };
        if ok_results.is_empty() {
            self.retry_or_fail(index);
            return;
        }
        match resolve_redundant(&ok_results) {
            QuorumOutcome::Agreed { bytes, dissenters } => {
                for (worker, _) in &ok_results {
                    if dissenters.contains(worker) {
                        continue;
                    }
                    if *worker != self.ctx.local_id {
                        self.ctx.registry.record_trust(worker, TRUST_DELTA_SUCCESS);
                    }
                }
                for dissenter in &dissenters {
                    warn!(
                        "[JobCoordinator] Worker {dissenter} dissented on job {} chunk {index}",
                        self.job.id
                    );
                    self.ctx
                        .observer
                        .on_event(&OrchestratorEvent::VerificationRejected {
                            job_id: self.job.id,
                            chunk_index: index as u32,
                            worker: dissenter.clone(),
                        });
                    if *dissenter != self.ctx.local_id {
                        self.ctx
                            .registry
                            .record_trust(dissenter, TRUST_DELTA_VERIFICATION_FAILURE);
                    }
                }
                let accepted_by = ok_results
                    .iter()
                    .find(|(w, _)| !dissenters.contains(w))
                    .map(|(w, _)| w.clone())
                    .unwrap_or_else(|| self.ctx.local_id.clone());
                self.ctx.observer.on_event(&OrchestratorEvent::ChunkCompleted {
                    job_id: self.job.id,
                    chunk_index: index as u32,
                    worker: accepted_by,
                });
                let slot = &mut self.chunks[index];
                slot.output = Some(bytes);
                slot.phase = ChunkPhase::Done;
                self.chunk_finished();
            }
            QuorumOutcome::Unresolved => {
                debug!(
                    "[JobCoordinator] Job {} chunk {index} unresolved; retrying on a disjoint worker set",
                    self.job.id
                );
                self.retry_or_fail(index);
            }
        }
    }

    fn retry_or_fail(&mut self, index: usize) {
        let slot = &mut self.chunks[index];
        if slot.retries_left == 0 {
            warn!(
                "[JobCoordinator] Job {} chunk {index} failed beyond its retry budget",
                self.job.id
            );
            slot.phase = ChunkPhase::Failed;
            self.chunk_finished();
            return;
        }
        slot.retries_left -= 1;
        self.dispatch_chunk(index as u32);
    }

    fn handle_deadlines(&mut self) {
        let now = self.ctx.time.unix_millis();
        for assignment in self.arena.take_expired(now) {
            let index = assignment.key.chunk_index as usize;
            let live = matches!(
                &self.chunks[index].phase,
                ChunkPhase::InFlight { attempt, .. } if *attempt == assignment.key.attempt
            );
            if !live {
                continue;
            }
            for worker in &assignment.pending {
                self.ctx
                    .observer
                    .on_event(&OrchestratorEvent::AssignmentTimedOut {
                        job_id: self.job.id,
                        chunk_index: assignment.key.chunk_index,
                        worker: worker.clone(),
                        attempt: assignment.key.attempt,
                    });
                if *worker != self.ctx.local_id {
                    self.ctx.registry.record_trust(worker, TRUST_DELTA_FAILURE);
                }
            }
            debug!(
                "[JobCoordinator] Job {} chunk {} attempt {} timed out with {} worker(s) pending",
                self.job.id,
                assignment.key.chunk_index,
                assignment.key.attempt,
                assignment.pending.len()
            );
            metrics::CHUNK_TIMEOUTS.inc();
            // Settle from whatever verified results arrived before the
            // deadline; an empty set counts against the retry budget.
            self.resolve_chunk(index);
        }
    }

    // --- Terminal paths ---

    fn handle_cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        info!("[JobCoordinator] Job {} cancelled", self.job.id);
        self.cancel.cancel();
        self.abort_in_flight();
        self.set_state(JobState::Cancelled);
        let _ = self.done_tx.send(Some(Err(FailureInfo {
            kind: FailureKind::Cancelled,
            detail: "job cancelled by caller".to_string(),
            failed_chunks: vec![],
        })));
        self.release_outstanding();
    }

    /// Best-effort abort messages to every remote worker still holding an
    /// assignment.
    fn abort_in_flight(&mut self) {
        let mut notified: HashSet<PeerId> = HashSet::new();
        for assignment in self.arena.clear_job(self.job.id) {
            for worker in assignment.pending {
                if worker == self.ctx.local_id || !notified.insert(worker.clone()) {
                    continue;
                }
                let ctx = Arc::clone(&self.ctx);
                let job_id = self.job.id;
                tokio::spawn(async move {
                    let message = WireMessage::new(
                        MessagePayload::AbortJob(weft_protocol::AbortRequest { job_id }),
                        ctx.local_id.clone(),
                    );
                    let _ = ctx.transport.send(&worker, message).await;
                });
            }
        }
    }

    fn finish_failed(&mut self, info: FailureInfo) {
        warn!(
            "[JobCoordinator] Job {} failed: {} ({:?})",
            self.job.id, info.detail, info.kind
        );
        self.cancel.cancel();
        self.set_state(JobState::Failed);
        let _ = self.done_tx.send(Some(Err(info)));
        metrics::JOBS_FAILED.inc();
        self.release_outstanding();
    }

    async fn merge(&mut self) -> Result<Vec<u8>, MergeEnd> {
        let ordered: Vec<Vec<u8>> = self
            .chunks
            .iter()
            .map(|slot| slot.output.clone().unwrap_or_default())
            .collect();
        let input = encode_merge_input(&ordered);
        let config = &self.job.manifest.config;
        let limits = ExecutionLimits {
            max_wall_ms: config.chunk_timeout_ms,
            max_cpu_ms: config.chunk_timeout_ms,
            max_memory_mb: self.ctx.config.chunk_memory_limit_mb,
        };
        let merge_fut = self.ctx.pool.execute(
            Arc::clone(&self.module),
            EntryPoint::Merge,
            input,
            limits,
            self.cancel.clone(),
            pool_priority(config.priority),
        );
        tokio::pin!(merge_fut);
        loop {
            tokio::select! {
                outcome = &mut merge_fut => {
                    return match outcome {
                        Ok(outcome) => Ok(outcome.output),
                        Err(SandboxError::Cancelled) => Err(MergeEnd::Cancelled),
                        Err(e) => Err(MergeEnd::Failed(e.to_string())),
                    };
                }
                msg = self.rx.recv() => match msg {
                    Some(CoordinatorMsg::Cancel) => {
                        // The merge future observes the token and winds
                        // down; late results are ignored.
                        self.cancel.cancel();
                    }
                    Some(CoordinatorMsg::Result(_)) | None => {}
                },
            }
        }
    }

    // --- Bookkeeping ---

    fn set_state(&mut self, state: JobState) {
        self.ctx.observer.on_event(&OrchestratorEvent::JobStateChanged {
            job_id: self.job.id,
            state: state.label().to_string(),
        });
        self.status_tx.send_modify(|status| {
            status.state = state;
        });
        self.push_status();
    }

    fn chunk_finished(&mut self) {
        if self.unfinished > 0 {
            self.unfinished -= 1;
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
        }
        self.push_status();
    }

    fn release_outstanding(&mut self) {
        if self.unfinished > 0 {
            self.outstanding.fetch_sub(self.unfinished, Ordering::SeqCst);
            self.unfinished = 0;
        }
    }

    fn push_status(&self) {
        let total = self.chunks.len() as u32;
        let completed = self
            .chunks
            .iter()
            .filter(|s| matches!(s.phase, ChunkPhase::Done))
            .count() as u32;
        let progress = if total == 0 {
            0.0
        } else {
            f64::from(completed) / f64::from(total)
        };
        let est_remaining_ms = if completed > 0 && completed < total {
            let elapsed = self.ctx.time.unix_millis().saturating_sub(self.started_ms);
            Some(elapsed * u64::from(total - completed) / u64::from(completed))
        } else {
            None
        };
        self.status_tx.send_modify(|status| {
            status.progress = progress;
            status.completed_chunks = completed;
            status.total_chunks = total;
            status.est_remaining_ms = est_remaining_ms;
        });
    }

    fn all_done(&self) -> bool {
        self.chunks
            .iter()
            .all(|s| matches!(s.phase, ChunkPhase::Done))
    }

    fn failed_chunks(&self) -> Option<Vec<u32>> {
        let failed: Vec<u32> = self
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s.phase, ChunkPhase::Failed))
            .map(|(i, _)| i as u32)
            .collect();
        if failed.is_empty() {
            None
        } else {
            Some(failed)
        }
    }
}

fn pool_priority(priority: Priority) -> PoolPriority {
    match priority {
        Priority::Low => PoolPriority::Low,
        Priority::Normal => PoolPriority::Normal,
        Priority::High => PoolPriority::High,
    }
}

fn status_for_sandbox_error(error: &SandboxError) -> TaskStatus {
    match error {
        SandboxError::LimitExceeded(weft_sandbox::LimitKind::Wall) => TaskStatus::Timeout,
        _ => TaskStatus::Failed,
    }
}

fn failure_result(
    job_id: weft_common::JobId,
    chunk_index: u32,
    worker: PeerId,
    attempt: u32,
    status: TaskStatus,
    error: String,
) -> TaskResultMessage {
    TaskResultMessage {
        job_id,
        chunk_index,
        worker,
        attempt,
        payload: None,
        result_hash: None,
        merkle_proof: None,
        duration_ms: 0,
        status,
        error: Some(error),
    }
}
