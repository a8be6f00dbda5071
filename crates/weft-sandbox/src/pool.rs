//! Dedicated execution pool.
//!
//! Sandbox execution is CPU-bound, so chunks run on a pool sized to the
//! local core count. Requests queue in a bounded channel; a dispatcher
//! serves the highest-priority waiting request whenever a worker slot
//! frees. Backpressure blocks the enqueue, or rejects immediately when the
//! pool is configured to fail fast under load.

use crate::{
    CancelToken, EntryPoint, ExecutionLimits, ExecutionOutcome, Sandbox, SandboxError,
};
use log::debug;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};

/// Priority of a pool request; higher serves first, FIFO within a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PoolPriority {
    Low,
    Normal,
    High,
}

struct PoolRequest {
    module: Arc<Vec<u8>>,
    entry: EntryPoint,
    input: Vec<u8>,
    limits: ExecutionLimits,
    cancel: CancelToken,
    priority: PoolPriority,
    seq: u64,
    reply: oneshot::Sender<Result<ExecutionOutcome, SandboxError>>,
}

impl PartialEq for PoolRequest {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for PoolRequest {}

impl PartialOrd for PoolRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PoolRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority wins, then lower sequence (older).
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Worker pool in front of a [`Sandbox`] backend.
pub struct ExecutorPool {
    tx: mpsc::Sender<PoolRequest>,
    seq: std::sync::atomic::AtomicU64,
    fail_fast: bool,
}

impl ExecutorPool {
    /// `workers` concurrent executions (size this to the core count) with
    /// up to `queue_cap` requests waiting.
    pub fn new(
        sandbox: Arc<dyn Sandbox>,
        workers: usize,
        queue_cap: usize,
        fail_fast: bool,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(queue_cap.max(1));
        let pool = Arc::new(Self {
            tx,
            seq: std::sync::atomic::AtomicU64::new(0),
            fail_fast,
        });
        tokio::spawn(dispatch_loop(sandbox, workers.max(1), rx));
        pool
    }

    /// Run `entry` of `module` on `input` when a worker slot is available.
    pub async fn execute(
        &self,
        module: Arc<Vec<u8>>,
        entry: EntryPoint,
        input: Vec<u8>,
        limits: ExecutionLimits,
        cancel: CancelToken,
        priority: PoolPriority,
    ) -> Result<ExecutionOutcome, SandboxError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = PoolRequest {
            module,
            entry,
            input,
            limits,
            cancel,
            priority,
            seq: self.seq.fetch_add(1, std::sync::atomic::Ordering::SeqCst),
            reply: reply_tx,
        };

        if self.fail_fast {
            self.tx
                .try_send(request)
                .map_err(|_| SandboxError::Saturated)?;
        } else {
            self.tx
                .send(request)
                .await
                .map_err(|_| SandboxError::Internal("executor pool is gone".to_string()))?;
        }

        reply_rx
            .await
            .map_err(|_| SandboxError::Internal("executor pool dropped the request".to_string()))?
    }
}

async fn dispatch_loop(
    sandbox: Arc<dyn Sandbox>,
    workers: usize,
    mut rx: mpsc::Receiver<PoolRequest>,
) {
    let slots = Arc::new(Semaphore::new(workers));
    let mut heap: BinaryHeap<PoolRequest> = BinaryHeap::new();

    loop {
        let permit = match Arc::clone(&slots).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        // Pull everything already waiting so priority applies across it.
        while let Ok(request) = rx.try_recv() {
            heap.push(request);
        }
        let request = match heap.pop() {
            Some(request) => request,
            None => match rx.recv().await {
                Some(request) => request,
                None => return,
            },
        };

        let sandbox = Arc::clone(&sandbox);
        tokio::spawn(async move {
            let result = if request.cancel.is_cancelled() {
                Err(SandboxError::Cancelled)
            } else {
                sandbox
                    .execute(
                        &request.module,
                        request.entry,
                        &request.input,
                        request.limits,
                        request.cancel,
                    )
                    .await
            };
            if request.reply.send(result).is_err() {
                debug!("[ExecutorPool] Caller went away before the result arrived");
            }
            drop(permit);
        });
    }
}
