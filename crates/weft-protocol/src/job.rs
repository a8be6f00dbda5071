//! Job manifests, per-job configuration, and chunk types.

use serde::{Deserialize, Serialize};
use weft_common::{CommonError, ContentHash, JobId};

/// How a job's input is divided into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitStrategy {
    /// Split on newline boundaries; rows are never divided.
    RowBased,
    /// Fixed-size byte windows.
    FixedChunk,
    /// The whole input is a single chunk.
    WholeInput,
}

/// How chunk results are validated before acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationMode {
    /// Accept any non-error result.
    None,
    /// Result hash must equal SHA-256 of the payload.
    Hash,
    /// Result carries a Merkle inclusion proof over 64 KiB leaves.
    Merkle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// Scheduling bias between local execution and delegation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalityPreference {
    PreferLocal,
    PreferRemote,
    Indifferent,
}

impl LocalityPreference {
    /// Multiplier applied to the delegation threshold: preferring local
    /// raises the bar for delegating, preferring remote lowers it.
    pub fn threshold_multiplier(&self) -> f64 {
        match self {
            LocalityPreference::PreferLocal => 2.0,
            LocalityPreference::PreferRemote => 0.5,
            LocalityPreference::Indifferent => 1.0,
        }
    }
}

/// Per-job configuration supplied at submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub split: SplitStrategy,
    /// Lower bound on chunk size in bytes (rows coalesce up to this).
    pub min_chunk_bytes: usize,
    /// Upper bound on chunk size in bytes.
    pub max_chunk_bytes: usize,
    pub verification: VerificationMode,
    /// Per-chunk execution deadline in milliseconds.
    pub chunk_timeout_ms: u64,
    /// How many times a chunk may be retried after a failure or timeout.
    pub retry_budget: u32,
    /// Redundancy factor: how many distinct workers receive each chunk.
    pub redundancy: u32,
    pub priority: Priority,
    pub locality: LocalityPreference,
    /// Bound on the recursive delegation tree depth.
    pub max_delegation_depth: u32,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            split: SplitStrategy::WholeInput,
            min_chunk_bytes: 1024,
            max_chunk_bytes: 256 * 1024,
            verification: VerificationMode::Hash,
            chunk_timeout_ms: 5_000,
            retry_budget: 3,
            redundancy: 1,
            priority: Priority::Normal,
            locality: LocalityPreference::Indifferent,
            max_delegation_depth: 3,
        }
    }
}

impl JobConfig {
    pub fn validate(&self) -> Result<(), CommonError> {
        if self.redundancy == 0 {
            return Err(CommonError::BadManifest(
                "redundancy factor must be at least 1".to_string(),
            ));
        }
        if self.max_chunk_bytes == 0 {
            return Err(CommonError::BadManifest(
                "max chunk size must be non-zero".to_string(),
            ));
        }
        if self.min_chunk_bytes > self.max_chunk_bytes {
            return Err(CommonError::BadManifest(format!(
                "min chunk size {} exceeds max chunk size {}",
                self.min_chunk_bytes, self.max_chunk_bytes
            )));
        }
        if self.chunk_timeout_ms == 0 {
            return Err(CommonError::BadManifest(
                "chunk timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// A user job as submitted: module bytes, input bytes, configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobManifest {
    /// Opaque computation module, hash-addressed.
    pub module: Vec<u8>,
    /// SHA-256 of the module bytes.
    pub module_hash: ContentHash,
    /// Input bytes the job operates on.
    pub input: Vec<u8>,
    pub config: JobConfig,
}

impl JobManifest {
    pub fn new(module: Vec<u8>, input: Vec<u8>, config: JobConfig) -> Self {
        let module_hash = ContentHash::from_bytes(&module);
        Self {
            module,
            module_hash,
            input,
            config,
        }
    }

    /// Admission validation. Module format checks beyond emptiness belong
    /// to the sandbox, which knows the expected header.
    pub fn validate(&self) -> Result<(), CommonError> {
        self.config.validate()?;
        if self.module.is_empty() {
            return Err(CommonError::BadManifest(
                "computation module is empty".to_string(),
            ));
        }
        if self.module_hash != ContentHash::from_bytes(&self.module) {
            return Err(CommonError::BadManifest(
                "module hash does not match module bytes".to_string(),
            ));
        }
        if self.input.is_empty() && self.config.split != SplitStrategy::WholeInput {
            return Err(CommonError::BadManifest(
                "empty input is only allowed with whole-input splitting".to_string(),
            ));
        }
        Ok(())
    }
}

/// An atomic unit of work: `(job, index)` plus the bytes. Immutable once
/// created by the split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub job_id: JobId,
    pub index: u32,
    pub bytes: Vec<u8>,
}
