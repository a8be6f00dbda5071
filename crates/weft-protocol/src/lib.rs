//! # Weft Protocol Crate
//! This crate defines the delegation RPC message formats exchanged between
//! Weft peers, ensuring interoperability between nodes regardless of the
//! transport carrying them.
//!
//! This is the single source of truth for wire messages: chunk delegation,
//! result return, module fetch-by-hash, and job abort.

use serde::{Deserialize, Serialize};
use weft_common::{ContentHash, JobId, PeerId};

pub mod job;
pub mod manifest;
pub mod split;

pub use job::{
    Chunk, JobConfig, JobManifest, LocalityPreference, Priority, SplitStrategy, VerificationMode,
};
pub use manifest::ShardManifest;

/// Protocol version for message compatibility.
pub const WIRE_PROTOCOL_VERSION: u32 = 1;

/// Main protocol message envelope wrapping all peer-to-peer communications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Protocol version for compatibility checking.
    pub version: u32,
    /// The actual message payload.
    pub payload: MessagePayload,
    /// Peer id of the sender.
    pub sender: PeerId,
    /// Message timestamp (Unix seconds).
    pub timestamp: u64,
}

impl WireMessage {
    /// Create a new message with the current timestamp.
    pub fn new(payload: MessagePayload, sender: PeerId) -> Self {
        Self {
            version: WIRE_PROTOCOL_VERSION,
            payload,
            sender,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

/// All possible message payload types in the delegation protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessagePayload {
    /// Hand a chunk to a peer for execution (possibly recursive).
    DelegateTask(DelegationRequest),
    /// Immediate answer to a delegation: accepted or refused.
    DelegateAck(DelegationAck),
    /// Return an execution result to the delegating manager.
    ReturnTaskResult(TaskResultMessage),
    /// Acknowledge receipt of a task result.
    ResultAck(ResultAck),
    /// Pull a computation module by content hash.
    ProvideModule(ModuleRequest),
    /// Response carrying module bytes (or nothing if unknown).
    ModuleData(ModuleResponse),
    /// Best-effort request to abort all work for a job.
    AbortJob(AbortRequest),
}

impl MessagePayload {
    /// Get a string identifier for the message type.
    pub fn message_type(&self) -> &'static str {
        match self {
            MessagePayload::DelegateTask(_) => "DelegateTask",
            MessagePayload::DelegateAck(_) => "DelegateAck",
            MessagePayload::ReturnTaskResult(_) => "ReturnTaskResult",
            MessagePayload::ResultAck(_) => "ResultAck",
            MessagePayload::ProvideModule(_) => "ProvideModule",
            MessagePayload::ModuleData(_) => "ModuleData",
            MessagePayload::AbortJob(_) => "AbortJob",
        }
    }
}

/// Hand a chunk to a peer for execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationRequest {
    /// Job the chunk belongs to.
    pub job_id: JobId,
    /// Index of the chunk within the job.
    pub chunk_index: u32,
    /// Attempt number for this chunk (exactly-once keying).
    pub attempt: u32,
    /// Content hash of the computation module.
    pub module_hash: ContentHash,
    /// The chunk bytes.
    pub chunk_bytes: Vec<u8>,
    /// Delegation depth of the sender; the receiver executes at depth + 1.
    pub current_depth: u32,
    /// Remaining time budget for this chunk in milliseconds.
    pub timeout_ms: u64,
    /// Verification mode the result must satisfy.
    pub verification: VerificationMode,
    /// Maximum delegation depth for this job.
    pub max_delegation_depth: u32,
}

/// Immediate answer to a delegation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationAck {
    /// Whether the peer accepted the chunk.
    pub accepted: bool,
    /// The peer's execution time estimate in milliseconds.
    pub est_ms: u32,
}

/// Terminal status of a task attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Ok,
    Failed,
    Timeout,
}

/// One sibling step of a Merkle inclusion proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    /// Hash of the sibling node.
    pub sibling: ContentHash,
    /// True when the sibling sits to the right of the running hash.
    pub sibling_is_right: bool,
}

/// Merkle inclusion proof for a result, leaf to root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Index of the proven leaf.
    pub leaf_index: u32,
    /// Hash of the proven leaf.
    pub leaf_hash: ContentHash,
    /// Sibling hashes from leaf to root.
    pub path: Vec<ProofStep>,
    /// Expected root hash.
    pub root: ContentHash,
}

/// Return an execution result to the delegating manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResultMessage {
    pub job_id: JobId,
    pub chunk_index: u32,
    /// Peer that produced the result.
    pub worker: PeerId,
    /// Attempt number this result answers.
    pub attempt: u32,
    /// Result bytes; absent on failure.
    pub payload: Option<Vec<u8>>,
    /// SHA-256 of the payload as claimed by the worker.
    pub result_hash: Option<ContentHash>,
    /// Merkle proof when the job's verification mode requires one.
    pub merkle_proof: Option<MerkleProof>,
    /// Wall-clock execution duration in milliseconds.
    pub duration_ms: u64,
    pub status: TaskStatus,
    /// Failure detail for `Failed` results.
    pub error: Option<String>,
}

impl TaskResultMessage {
    /// Exactly-once deduplication key for this result.
    pub fn dedup_key(&self) -> (JobId, u32, PeerId, u32) {
        (
            self.job_id,
            self.chunk_index,
            self.worker.clone(),
            self.attempt,
        )
    }
}

/// Acknowledge receipt of a task result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultAck {
    /// False when the manager discarded the result as a duplicate or the
    /// job is no longer running.
    pub accepted: bool,
}

/// Pull a computation module by content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRequest {
    pub module_hash: ContentHash,
}

/// Response carrying module bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleResponse {
    pub module_hash: ContentHash,
    /// The module bytes, or `None` when the peer does not hold them.
    pub module_bytes: Option<Vec<u8>>,
}

/// Best-effort request to abort all work for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbortRequest {
    pub job_id: JobId,
}
