//! # Weft Common Crate
//! This crate provides common data structures, types, utilities, and error
//! definitions shared across the Weft core crates: opaque identifiers,
//! content hashing, time abstraction, and the structured event observer.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

pub mod capability;
pub mod events;
pub mod retry;

pub use capability::{CapabilityProbe, NodeCapacity};
pub use events::{EventObserver, NullObserver, OrchestratorEvent, RecordingObserver};

pub const WEFT_CORE_VERSION: &str = "0.2.0";

/// Opaque peer identifier. The core never interprets the contents; it only
/// compares, orders, and hashes it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// 128-bit random job identifier, displayed as 32 hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub u128);

impl JobId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        let hi = fastrand::u64(..) as u128;
        let lo = fastrand::u64(..) as u128;
        Self((hi << 64) | lo)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for JobId {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u128::from_str_radix(s, 16)
            .map(JobId)
            .map_err(|e| CommonError::InvalidParameters(format!("invalid job id '{s}': {e}")))
    }
}

/// SHA-256 content hash used everywhere integrity is claimed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Digests `data` with SHA-256.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)
            .map_err(|e| CommonError::InvalidParameters(format!("invalid hash '{s}': {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CommonError::InvalidParameters(format!("hash '{s}' is not 32 bytes")))?;
        Ok(Self(arr))
    }
}

/// Errors surfaced by the Weft core crates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommonError {
    #[error("Job manifest rejected at admission: {0}")]
    BadManifest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Capacity exhausted: {0}")]
    NoCapacity(String),

    #[error("Cache capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Result verification failed: {0}")]
    VerificationFailed(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("Serialization failed: {0}")]
    SerializationError(String),

    #[error("Deserialization failed: {0}")]
    DeserializationError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Invalid input or parameters: {0}")]
    InvalidParameters(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Abstraction over wall-clock reads so deadline logic stays testable.
pub trait TimeProvider: Send + Sync {
    /// Seconds since the Unix epoch.
    fn unix_seconds(&self) -> u64;

    /// Milliseconds since the Unix epoch.
    fn unix_millis(&self) -> u64;
}

/// Production time source backed by `SystemTime`.
#[derive(Debug, Default, Clone)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn unix_seconds(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    fn unix_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Fixed time source for tests; advanced manually.
#[derive(Debug, Default)]
pub struct FixedTimeProvider {
    millis: std::sync::atomic::AtomicU64,
}

impl FixedTimeProvider {
    pub fn new(unix_seconds: u64) -> Self {
        Self {
            millis: std::sync::atomic::AtomicU64::new(unix_seconds * 1000),
        }
    }

    pub fn advance_secs(&self, secs: u64) {
        self.millis
            .fetch_add(secs * 1000, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn advance_millis(&self, ms: u64) {
        self.millis.fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }
}

impl TimeProvider for FixedTimeProvider {
    fn unix_seconds(&self) -> u64 {
        self.millis.load(std::sync::atomic::Ordering::SeqCst) / 1000
    }

    fn unix_millis(&self) -> u64 {
        self.millis.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_random_and_round_trip() {
        let a = JobId::generate();
        let b = JobId::generate();
        assert_ne!(a, b);

        let text = a.to_string();
        assert_eq!(text.len(), 32);
        assert_eq!(JobId::from_str(&text).unwrap(), a);
    }

    #[test]
    fn content_hash_matches_known_vector() {
        // SHA-256 of the empty string.
        let hash = ContentHash::from_bytes(b"");
        assert_eq!(
            hash.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(ContentHash::from_str(&hash.to_hex()).unwrap(), hash);
    }

    #[test]
    fn content_hash_rejects_bad_input() {
        assert!(ContentHash::from_str("zz").is_err());
        assert!(ContentHash::from_str("abcd").is_err());
    }

    #[test]
    fn fixed_time_advances() {
        let time = FixedTimeProvider::new(100);
        assert_eq!(time.unix_seconds(), 100);
        time.advance_secs(20);
        assert_eq!(time.unix_seconds(), 120);
        time.advance_millis(500);
        assert_eq!(time.unix_millis(), 120_500);
    }
}
