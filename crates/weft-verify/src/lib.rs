//! # Weft Verify Crate
//! Integrity checking of worker results under the per-job verification
//! mode (none, hash, or Merkle proof), plus bytewise comparison of
//! redundant results from distinct workers.

use log::debug;
use weft_common::ContentHash;
use weft_protocol::{TaskResultMessage, TaskStatus, VerificationMode};

pub mod merkle;
pub mod quorum;

pub use merkle::{verify_data_against_proof, verify_proof, MerkleTree, MERKLE_LEAF_BYTES};
pub use quorum::{resolve_redundant, QuorumOutcome};

/// Why a result was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("result reported non-ok status")]
    NotOk,

    #[error("result payload is missing")]
    MissingPayload,

    #[error("result hash is missing")]
    MissingHash,

    #[error("result hash mismatch: claimed {claimed}, computed {computed}")]
    HashMismatch {
        claimed: ContentHash,
        computed: ContentHash,
    },

    #[error("Merkle proof is missing")]
    MissingProof,

    #[error("Merkle proof does not verify")]
    ProofInvalid,
}

/// Check one task result against the job's verification mode. A result
/// accepted here is the only kind ever surfaced upstream as `ok`.
pub fn verify_result(mode: VerificationMode, result: &TaskResultMessage) -> Result<(), VerifyError> {
    if result.status != TaskStatus::Ok {
        return Err(VerifyError::NotOk);
    }
    let payload = result.payload.as_deref().ok_or(VerifyError::MissingPayload)?;

    match mode {
        VerificationMode::None => Ok(()),
        VerificationMode::Hash => {
            let claimed = result.result_hash.ok_or(VerifyError::MissingHash)?;
            let computed = ContentHash::from_bytes(payload);
            if claimed == computed {
                Ok(())
            } else {
                debug!(
                    "[Verifier] Hash mismatch for job {} chunk {} from {}",
                    result.job_id, result.chunk_index, result.worker
                );
                Err(VerifyError::HashMismatch { claimed, computed })
            }
        }
        VerificationMode::Merkle => {
            let proof = result.merkle_proof.as_ref().ok_or(VerifyError::MissingProof)?;
            if verify_data_against_proof(payload, proof) {
                Ok(())
            } else {
                debug!(
                    "[Verifier] Merkle proof rejected for job {} chunk {} from {}",
                    result.job_id, result.chunk_index, result.worker
                );
                Err(VerifyError::ProofInvalid)
            }
        }
    }
}

/// Build the integrity attachments a worker sends with an ok result.
pub fn attest_result(mode: VerificationMode, payload: &[u8]) -> ResultAttestation {
    match mode {
        VerificationMode::None => ResultAttestation {
            result_hash: None,
            merkle_proof: None,
        },
        VerificationMode::Hash => ResultAttestation {
            result_hash: Some(ContentHash::from_bytes(payload)),
            merkle_proof: None,
        },
        VerificationMode::Merkle => {
            let tree = MerkleTree::build(payload);
            ResultAttestation {
                result_hash: Some(ContentHash::from_bytes(payload)),
                merkle_proof: tree.proof_for(0),
            }
        }
    }
}

/// Integrity attachments for a task result.
#[derive(Debug, Clone)]
pub struct ResultAttestation {
    pub result_hash: Option<ContentHash>,
    pub merkle_proof: Option<weft_protocol::MerkleProof>,
}
