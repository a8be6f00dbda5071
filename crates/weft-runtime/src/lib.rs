//! # Weft Runtime Crate
//! Job lifecycle management for the Weft compute mesh: admission, split,
//! dispatch across peers, result collection and verification, merge, and
//! finalization. Every peer runs this crate; the manager-versus-worker
//! role is decided per chunk, not per node.

pub mod config;
mod context;
mod coordinator;
mod delegation;
pub mod error;
pub mod job;
mod manager;
pub mod metrics;
mod node;

pub use config::SystemConfig;
pub use context::NodeContext;
pub use delegation::DelegationService;
pub use error::MeshJobError;
pub use job::{FailureInfo, FailureKind, Job, JobOutcome, JobState, JobStatus, ResultFetch};
pub use manager::JobManager;
pub use node::MeshNode;
