use thiserror::Error;
use weft_common::{CommonError, JobId};
use weft_network::TransportError;
use weft_sandbox::SandboxError;

/// Errors that can occur while driving mesh jobs.
#[derive(Debug, Error)]
pub enum MeshJobError {
    #[error("transport failure while driving a mesh job: {0}")]
    Network(#[from] TransportError),

    #[error("the sandbox refused or failed the work: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("no eligible worker remains for job {job_id}")]
    NoSuitableWorker { job_id: JobId },

    #[error("no live coordinator owns job {job_id}")]
    UnknownJob { job_id: JobId },

    #[error("module {module_hash} could not be resolved locally or from the delegating peer")]
    ModuleUnavailable { module_hash: String },

    #[error("job {job_id} cannot make progress: {reason}")]
    ProcessingFailure { job_id: JobId, reason: String },

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("coordinator invariant violated: {0}")]
    Internal(String),
}
