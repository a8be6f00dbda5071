//! # Weft Sandbox Crate
//! Runs user-supplied computation modules on byte chunks under CPU,
//! memory, and wall-clock bounds. The reference backend is a WebAssembly
//! sandbox (wasmtime) with fuel-based CPU metering; any embeddable
//! bytecode VM with resource metering satisfies the [`Sandbox`] trait.
//!
//! Modules see no network, no filesystem, no host environment, and no
//! clock or randomness unless explicitly granted: execution is
//! deterministic by default.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub mod metrics;
mod pool;
mod stub;
mod wasm;

pub use pool::{ExecutorPool, PoolPriority};
pub use stub::{decode_merge_input, StubSandbox};
pub use wasm::WasmSandbox;

/// Largest accepted computation module.
pub const MAX_MODULE_BYTES: usize = 16 * 1024 * 1024;

/// Largest accepted execution output.
pub const MAX_OUTPUT_BYTES: usize = 64 * 1024 * 1024;

/// WebAssembly magic bytes every module must open with.
pub const WASM_MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];

/// Which resource bound was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Cpu,
    Memory,
    Wall,
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitKind::Cpu => write!(f, "cpu"),
            LimitKind::Memory => write!(f, "mem"),
            LimitKind::Wall => write!(f, "wall"),
        }
    }
}

/// Failure kinds of a sandboxed execution. A runtime fault inside the
/// module maps to `Trap` and never crosses into the host as a panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    #[error("module rejected: {0}")]
    InvalidModule(String),

    #[error("resource limit exceeded: {0}")]
    LimitExceeded(LimitKind),

    #[error("output exceeds {MAX_OUTPUT_BYTES} bytes")]
    OutputTooLarge,

    #[error("module trapped: {0}")]
    Trap(String),

    #[error("execution cancelled")]
    Cancelled,

    #[error("executor pool saturated")]
    Saturated,

    #[error("internal sandbox error: {0}")]
    Internal(String),
}

/// Resource bounds for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub max_wall_ms: u64,
    pub max_cpu_ms: u64,
    pub max_memory_mb: u64,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_wall_ms: 5_000,
            max_cpu_ms: 5_000,
            max_memory_mb: 256,
        }
    }
}

/// Resource usage measured during an execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionMetrics {
    pub wall_ms: u64,
    /// CPU time; approximated from consumed fuel when the OS offers no
    /// per-execution counter.
    pub cpu_ms: u64,
    pub peak_memory_mb: u64,
}

/// Output plus metering for one execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub output: Vec<u8>,
    pub metrics: ExecutionMetrics,
}

/// Cooperative cancellation flag honored by the sandbox watchdog.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Which entry point of a module to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    /// `run(ptr, len)` — map over one chunk.
    Run,
    /// `merge(ptr, len)` — fold the length-prefixed list of ordered
    /// results into the final output.
    Merge,
}

impl EntryPoint {
    pub fn export_name(&self) -> &'static str {
        match self {
            EntryPoint::Run => "run",
            EntryPoint::Merge => "merge",
        }
    }
}

/// Sandbox backend plugin point.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Execute `entry` of `module` on `input` under `limits`.
    async fn execute(
        &self,
        module: &[u8],
        entry: EntryPoint,
        input: &[u8],
        limits: ExecutionLimits,
        cancel: CancelToken,
    ) -> Result<ExecutionOutcome, SandboxError>;

    /// Validate module bytes without executing them.
    fn validate_module(&self, module: &[u8]) -> Result<(), SandboxError>;
}

/// Header and size checks shared by sandbox backends.
pub fn validate_module_bytes(module: &[u8]) -> Result<(), SandboxError> {
    if module.len() > MAX_MODULE_BYTES {
        return Err(SandboxError::InvalidModule(format!(
            "module is {} bytes, limit is {}",
            module.len(),
            MAX_MODULE_BYTES
        )));
    }
    if module.len() < 8 || module[..4] != WASM_MAGIC {
        return Err(SandboxError::InvalidModule(
            "missing WebAssembly magic header".to_string(),
        ));
    }
    Ok(())
}

/// Encode an ordered result list for the `merge` entry point: a u32-LE
/// count, then a u32-LE length prefix before each item.
pub fn encode_merge_input(results: &[Vec<u8>]) -> Vec<u8> {
    let total: usize = results.iter().map(|r| 4 + r.len()).sum();
    let mut out = Vec::with_capacity(4 + total);
    out.extend_from_slice(&(results.len() as u32).to_le_bytes());
    for result in results {
        out.extend_from_slice(&(result.len() as u32).to_le_bytes());
        out.extend_from_slice(result);
    }
    out
}
