//! # Weft Cache Crate
//! Content-addressed shard cache shared by the compute and bulk transfer
//! paths. Shards live in memory under a strict LRU policy with a byte cap
//! and pin-based eviction protection; manifests for the bulk transfer path
//! are persisted to disk and never pass through LRU eviction.

use serde::{Deserialize, Serialize};
use std::fmt;
use weft_common::{ContentHash, JobId};

mod cache;
mod manifest_store;
pub mod metrics;

pub use cache::{CacheStats, ShardCache, ShardHandle};
pub use manifest_store::{DirManifestStore, InMemoryManifestStore, ManifestStore};

/// Key addressing a cached byte buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShardKey {
    /// A chunk of a compute job's input or an intermediate result.
    Chunk { job_id: JobId, index: u32 },
    /// The merged final output of a job.
    Output { job_id: JobId },
    /// A shard of a content-addressed object on the bulk transfer path.
    Content { hash: ContentHash, index: u32 },
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardKey::Chunk { job_id, index } => write!(f, "chunk:{job_id}:{index}"),
            ShardKey::Output { job_id } => write!(f, "output:{job_id}"),
            ShardKey::Content { hash, index } => write!(f, "content:{hash}:{index}"),
        }
    }
}
