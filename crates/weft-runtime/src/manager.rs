//! The job manager: the external RPC surface of a node.
//!
//! Admission validates the manifest and applies backpressure; each
//! admitted job gets its own coordinator task. Status and result queries
//! read watch channels, so they never contend with the coordinator.

use crate::context::NodeContext;
use crate::coordinator::{CoordinatorMsg, JobCoordinator};
use crate::job::{Job, JobOutcome, JobStatus, ResultFetch};
use crate::metrics;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use weft_common::{CommonError, JobId};
use weft_protocol::{JobManifest, TaskResultMessage};

struct JobEntry {
    tx: mpsc::UnboundedSender<CoordinatorMsg>,
    status_rx: watch::Receiver<JobStatus>,
    done_rx: watch::Receiver<Option<JobOutcome>>,
    submitted_at_ms: u64,
}

/// Owns every job this node manages.
pub struct JobManager {
    ctx: Arc<NodeContext>,
    jobs: Mutex<HashMap<JobId, JobEntry>>,
    /// Chunks in flight across all jobs, for admission backpressure.
    outstanding_chunks: Arc<AtomicUsize>,
}

impl JobManager {
    pub fn new(ctx: Arc<NodeContext>) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            jobs: Mutex::new(HashMap::new()),
            outstanding_chunks: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Admit a job. Rejects invalid manifests with `BadManifest` and
    /// applies the outstanding-chunk ceiling with `NoCapacity`.
    pub fn submit_job(&self, manifest: JobManifest) -> Result<JobId, CommonError> {
        manifest.validate()?;
        self.ctx
            .sandbox
            .validate_module(&manifest.module)
            .map_err(|e| CommonError::BadManifest(e.to_string()))?;

        let outstanding = self.outstanding_chunks.load(Ordering::SeqCst);
        if outstanding >= self.ctx.config.max_outstanding_chunks {
            return Err(CommonError::NoCapacity(format!(
                "{outstanding} chunks already in flight"
            )));
        }
        let cache_stats = self.ctx.cache.stats();
        if cache_stats.total_bytes >= self.ctx.config.cache_max_bytes
            && self.ctx.cache.evictable_bytes() == 0
        {
            return Err(CommonError::NoCapacity(
                "cache is at capacity with every entry pinned".to_string(),
            ));
        }

        let job_id = JobId::generate();
        self.ctx.store_module(manifest.module.clone());
        let module = self
            .ctx
            .module(&manifest.module_hash)
            .expect("module was just stored");

        let job = Job {
            id: job_id,
            manifest,
            submitted_at_ms: self.ctx.time.unix_millis(),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(JobStatus::initial());
        let (done_tx, done_rx) = watch::channel(None);

        let entry = JobEntry {
            tx: tx.clone(),
            status_rx,
            done_rx,
            submitted_at_ms: job.submitted_at_ms,
        };
        self.jobs.lock().unwrap().insert(job_id, entry);

        let coordinator = JobCoordinator::new(
            Arc::clone(&self.ctx),
            job,
            module,
            rx,
            tx,
            status_tx,
            done_tx,
            Arc::clone(&self.outstanding_chunks),
        );
        tokio::spawn(coordinator.run());
        metrics::JOBS_SUBMITTED.inc();
        info!("[JobManager] Submitted job {job_id}");
        Ok(job_id)
    }

    /// Current status of a job.
    pub fn get_status(&self, job_id: JobId) -> Result<JobStatus, CommonError> {
        let jobs = self.jobs.lock().unwrap();
        jobs.get(&job_id)
            .map(|entry| entry.status_rx.borrow().clone())
            .ok_or_else(|| CommonError::NotFound(format!("job {job_id}")))
    }

    /// Fetch a job's result, waiting up to `wait_ms` for it to reach a
    /// terminal state. Partial results are never returned on failure.
    pub async fn get_result(
        &self,
        job_id: JobId,
        wait_ms: u64,
    ) -> Result<ResultFetch, CommonError> {
        let mut done_rx = {
            let jobs = self.jobs.lock().unwrap();
            jobs.get(&job_id)
                .map(|entry| entry.done_rx.clone())
                .ok_or_else(|| CommonError::NotFound(format!("job {job_id}")))?
        };

        if done_rx.borrow().is_none() && wait_ms > 0 {
            let wait = Duration::from_millis(wait_ms);
            let _ = tokio::time::timeout(wait, async {
                loop {
                    if done_rx.changed().await.is_err() {
                        break;
                    }
                    if done_rx.borrow().is_some() {
                        break;
                    }
                }
            })
            .await;
        }

        let outcome = done_rx.borrow().clone();
        Ok(match outcome {
            Some(Ok(bytes)) => ResultFetch::Ready(bytes),
            Some(Err(info)) => ResultFetch::Failed(info),
            None => ResultFetch::StillRunning,
        })
    }

    /// Cancel a job. Succeeds idempotently for jobs already terminal.
    pub fn cancel_job(&self, job_id: JobId) -> Result<(), CommonError> {
        let jobs = self.jobs.lock().unwrap();
        let entry = jobs
            .get(&job_id)
            .ok_or_else(|| CommonError::NotFound(format!("job {job_id}")))?;
        // A closed channel means the coordinator already finished; the
        // cancel is a no-op then.
        let _ = entry.tx.send(CoordinatorMsg::Cancel);
        Ok(())
    }

    /// Route an inbound task result to the owning coordinator. Returns
    /// false when no live coordinator wants it (late or duplicate results
    /// after cancellation land here).
    pub(crate) fn route_result(&self, result: TaskResultMessage) -> bool {
        let jobs = self.jobs.lock().unwrap();
        match jobs.get(&result.job_id) {
            Some(entry) => entry.tx.send(CoordinatorMsg::Result(result)).is_ok(),
            None => {
                debug!(
                    "[JobManager] Dropping result for unknown job {}",
                    result.job_id
                );
                false
            }
        }
    }

    /// Drop bookkeeping for terminal jobs older than `ttl_secs`. Driven
    /// by the maintenance sweep; cached outputs stay subject to the shard
    /// cache's own policy.
    pub fn prune_finished(&self, ttl_secs: u64) -> usize {
        let now_ms = self.ctx.time.unix_millis();
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|_, entry| {
            let terminal = entry.done_rx.borrow().is_some();
            let age_ms = now_ms.saturating_sub(entry.submitted_at_ms);
            !(terminal && age_ms > ttl_secs * 1000)
        });
        before - jobs.len()
    }

    /// Chunks currently in flight across all jobs.
    pub fn outstanding_chunks(&self) -> usize {
        self.outstanding_chunks.load(Ordering::SeqCst)
    }
}
