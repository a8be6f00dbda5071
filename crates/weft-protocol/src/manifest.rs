//! On-disk shard manifest record.
//!
//! Manifests bind a content hash to shard locations for the bulk transfer
//! path. The record is versioned so the layout can evolve without breaking
//! readers: a magic tag, a format version byte, then a bincode body.

use serde::{Deserialize, Serialize};
use weft_common::{CommonError, ContentHash, PeerId};

/// Magic tag opening every persisted manifest record.
const MANIFEST_MAGIC: &[u8; 4] = b"WFTM";

/// Current manifest format version.
const MANIFEST_FORMAT_VERSION: u8 = 1;

/// Record binding a content hash to the locations of its shards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardManifest {
    /// Hash of the complete content.
    pub content_hash: ContentHash,
    /// Size of the original content in bytes.
    pub original_size: u64,
    /// Number of shards the content was divided into.
    pub shard_count: u32,
    /// Where each shard lives: `(shard_index, peer)`.
    pub shard_locations: Vec<(u32, PeerId)>,
    /// Creation time, Unix seconds.
    pub created_at_epoch: i64,
    /// Lifetime from creation in seconds.
    pub ttl_seconds: u32,
}

impl ShardManifest {
    /// True once `now` (Unix seconds) is past creation plus TTL.
    pub fn is_expired(&self, now: u64) -> bool {
        let deadline = self.created_at_epoch.saturating_add(i64::from(self.ttl_seconds));
        now as i64 >= deadline
    }

    /// Encode as a self-describing versioned record.
    pub fn encode(&self) -> Result<Vec<u8>, CommonError> {
        let body = bincode::serialize(self).map_err(|e| {
            CommonError::SerializationError(format!(
                "failed to serialize manifest {}: {}",
                self.content_hash, e
            ))
        })?;
        let mut record = Vec::with_capacity(5 + body.len());
        record.extend_from_slice(MANIFEST_MAGIC);
        record.push(MANIFEST_FORMAT_VERSION);
        record.extend_from_slice(&body);
        Ok(record)
    }

    /// Decode a versioned record, rejecting unknown magic or versions.
    pub fn decode(record: &[u8]) -> Result<Self, CommonError> {
        if record.len() < 5 || &record[..4] != MANIFEST_MAGIC {
            return Err(CommonError::DeserializationError(
                "not a manifest record".to_string(),
            ));
        }
        let version = record[4];
        if version != MANIFEST_FORMAT_VERSION {
            return Err(CommonError::DeserializationError(format!(
                "unsupported manifest format version {version}"
            )));
        }
        bincode::deserialize(&record[5..]).map_err(|e| {
            CommonError::DeserializationError(format!("failed to decode manifest body: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ShardManifest {
        ShardManifest {
            content_hash: ContentHash::from_bytes(b"content"),
            original_size: 4096,
            shard_count: 2,
            shard_locations: vec![(0, PeerId::from("node-a")), (1, PeerId::from("node-b"))],
            created_at_epoch: 1_700_000_000,
            ttl_seconds: 3600,
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let manifest = sample();
        let record = manifest.encode().unwrap();
        assert_eq!(&record[..4], MANIFEST_MAGIC);
        assert_eq!(ShardManifest::decode(&record).unwrap(), manifest);
    }

    #[test]
    fn decode_rejects_unknown_version() {
        let mut record = sample().encode().unwrap();
        record[4] = 9;
        assert!(matches!(
            ShardManifest::decode(&record),
            Err(CommonError::DeserializationError(_))
        ));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(ShardManifest::decode(b"XX").is_err());
        assert!(ShardManifest::decode(b"NOPE....").is_err());
    }

    #[test]
    fn expiry_respects_ttl() {
        let manifest = sample();
        assert!(!manifest.is_expired(1_700_000_000));
        assert!(!manifest.is_expired(1_700_003_599));
        assert!(manifest.is_expired(1_700_003_600));
    }
}
