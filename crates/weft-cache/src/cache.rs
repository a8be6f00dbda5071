//! In-memory shard cache with strict LRU eviction and pinning, plus the
//! persisted manifest index.

use crate::manifest_store::ManifestStore;
use crate::{metrics, ShardKey};
use log::{debug, warn};
use lru::LruCache;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use weft_common::{
    CommonError, ContentHash, EventObserver, NullObserver, OrchestratorEvent,
};
use weft_protocol::ShardManifest;

/// Headroom kept free beyond the requested size when evicting, as a
/// fraction denominator (10%).
const EVICTION_HEADROOM_DIV: u64 = 10;

struct ShardEntry {
    bytes: Arc<Vec<u8>>,
    pins: u64,
}

struct CacheInner {
    entries: HashMap<ShardKey, ShardEntry>,
    /// Recency order; the value is the entry size in bytes.
    order: LruCache<ShardKey, u64>,
    max_bytes: u64,
    total_bytes: u64,
    hits: u64,
    misses: u64,
}

/// Cache usage counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total_bytes: u64,
    pub entry_count: usize,
}

/// Content-addressed shard cache with a byte cap, strict LRU eviction, and
/// pin-based protection for in-flight entries. Manifests are kept in a
/// separate persisted index that LRU eviction never touches.
pub struct ShardCache {
    inner: Arc<Mutex<CacheInner>>,
    manifests: Mutex<HashMap<ContentHash, ShardManifest>>,
    store: Arc<dyn ManifestStore>,
    observer: Arc<dyn EventObserver>,
}

impl ShardCache {
    pub fn new(max_bytes: u64, store: Arc<dyn ManifestStore>) -> Self {
        Self::with_observer(max_bytes, store, Arc::new(NullObserver))
    }

    pub fn with_observer(
        max_bytes: u64,
        store: Arc<dyn ManifestStore>,
        observer: Arc<dyn EventObserver>,
    ) -> Self {
        let cache = Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: LruCache::unbounded(),
                max_bytes,
                total_bytes: 0,
                hits: 0,
                misses: 0,
            })),
            manifests: Mutex::new(HashMap::new()),
            store,
            observer,
        };
        cache.load_manifests();
        cache
    }

    /// Insert a shard. Evicts least-recently-used unpinned entries until
    /// free space covers the requested size plus 10% headroom; if eviction
    /// cannot make room, returns `CapacityExceeded` without mutating state.
    pub fn put_shard(&self, key: ShardKey, bytes: Vec<u8>) -> Result<(), CommonError> {
        let size = bytes.len() as u64;
        let mut inner = self.inner.lock().unwrap();

        if inner.entries.contains_key(&key) {
            // Content-addressed keys carry identical bytes; a re-put only
            // refreshes recency.
            inner.order.get(&key);
            return Ok(());
        }

        let needed = size + size / EVICTION_HEADROOM_DIV;
        let free = inner.max_bytes.saturating_sub(inner.total_bytes);
        let victims = if free >= needed {
            Vec::new()
        } else {
            match plan_eviction(&inner, needed - free) {
                Some(victims) => victims,
                None => {
                    return Err(CommonError::CapacityExceeded(format!(
                        "cannot free {} bytes for {}",
                        needed - free,
                        key
                    )));
                }
            }
        };

        for victim in victims {
            if let Some(entry) = inner.entries.remove(&victim) {
                let evicted_size = entry.bytes.len() as u64;
                inner.order.pop(&victim);
                inner.total_bytes -= evicted_size;
                metrics::SHARD_EVICTIONS.inc();
                debug!("[ShardCache] Evicted {} ({} bytes)", victim, evicted_size);
                self.observer.on_event(&OrchestratorEvent::ShardEvicted {
                    key: victim.to_string(),
                    size_bytes: evicted_size,
                });
            }
        }

        inner.entries.insert(
            key.clone(),
            ShardEntry {
                bytes: Arc::new(bytes),
                pins: 0,
            },
        );
        inner.order.put(key, size);
        inner.total_bytes += size;
        metrics::SHARD_PUTS.inc();
        Ok(())
    }

    /// Look up a shard. A hit returns a pinned handle; the entry cannot be
    /// evicted until every handle is dropped.
    pub fn get_shard(&self, key: &ShardKey) -> Option<ShardHandle> {
        let mut inner = self.inner.lock().unwrap();
        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.pins += 1;
                let bytes = Arc::clone(&entry.bytes);
                inner.order.get(key);
                inner.hits += 1;
                Some(ShardHandle {
                    key: key.clone(),
                    bytes,
                    inner: Arc::clone(&self.inner),
                })
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Membership test that does not touch recency or hit counters.
    pub fn contains(&self, key: &ShardKey) -> bool {
        self.inner.lock().unwrap().entries.contains_key(key)
    }

    /// Bytes reclaimable by eviction right now (unpinned entries).
    pub fn evictable_bytes(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .values()
            .filter(|e| e.pins == 0)
            .map(|e| e.bytes.len() as u64)
            .sum()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            total_bytes: inner.total_bytes,
            entry_count: inner.entries.len(),
        }
    }

    // --- Manifest index (persisted, exempt from LRU) ---

    /// Store a manifest in the index and persist it. Disk write errors are
    /// surfaced to the caller.
    pub fn put_manifest(&self, manifest: ShardManifest) -> Result<(), CommonError> {
        let record = manifest.encode()?;
        self.store
            .write(&manifest.content_hash.to_hex(), &record)?;
        self.manifests
            .lock()
            .unwrap()
            .insert(manifest.content_hash, manifest);
        Ok(())
    }

    pub fn get_manifest(&self, hash: &ContentHash) -> Option<ShardManifest> {
        self.manifests.lock().unwrap().get(hash).cloned()
    }

    /// Extend a manifest's lifetime and rewrite the persisted record.
    pub fn refresh_ttl(&self, hash: &ContentHash, new_ttl_seconds: u32) -> Result<(), CommonError> {
        let mut manifests = self.manifests.lock().unwrap();
        let manifest = manifests
            .get_mut(hash)
            .ok_or_else(|| CommonError::NotFound(format!("manifest {hash}")))?;
        manifest.ttl_seconds = new_ttl_seconds;
        let record = manifest.encode()?;
        self.store.write(&hash.to_hex(), &record)
    }

    /// Drop manifests whose TTL has elapsed at `now` (Unix seconds),
    /// returning the hashes removed.
    pub fn remove_expired_manifests(&self, now: u64) -> Result<Vec<ContentHash>, CommonError> {
        let mut manifests = self.manifests.lock().unwrap();
        let expired: Vec<ContentHash> = manifests
            .iter()
            .filter(|(_, m)| m.is_expired(now))
            .map(|(h, _)| *h)
            .collect();
        for hash in &expired {
            manifests.remove(hash);
            self.store.delete(&hash.to_hex())?;
        }
        Ok(expired)
    }

    pub fn manifest_count(&self) -> usize {
        self.manifests.lock().unwrap().len()
    }

    fn load_manifests(&self) {
        let records = match self.store.read_all() {
            Ok(records) => records,
            Err(e) => {
                warn!("[ShardCache] Manifest scan failed on startup: {e}");
                return;
            }
        };
        let mut manifests = self.manifests.lock().unwrap();
        for record in records {
            match ShardManifest::decode(&record) {
                Ok(manifest) => {
                    manifests.insert(manifest.content_hash, manifest);
                }
                Err(e) => warn!("[ShardCache] Skipping unreadable manifest record: {e}"),
            }
        }
        if !manifests.is_empty() {
            debug!("[ShardCache] Loaded {} manifests from disk", manifests.len());
        }
    }
}

/// Collect least-recently-used unpinned victims freeing at least
/// `shortfall` bytes, or `None` when even a full sweep cannot make room.
fn plan_eviction(inner: &CacheInner, shortfall: u64) -> Option<Vec<ShardKey>> {
    let mut reclaimed = 0u64;
    let mut victims = Vec::new();
    // LruCache iterates most-recently-used first; walk from the cold end.
    let order: Vec<(ShardKey, u64)> = inner
        .order
        .iter()
        .map(|(k, size)| (k.clone(), *size))
        .collect();
    for (key, size) in order.into_iter().rev() {
        if reclaimed >= shortfall {
            break;
        }
        let pinned = inner.entries.get(&key).map(|e| e.pins > 0).unwrap_or(false);
        if pinned {
            continue;
        }
        reclaimed += size;
        victims.push(key);
    }
    if reclaimed >= shortfall {
        Some(victims)
    } else {
        None
    }
}

/// Borrowed view of a cached shard. Holding a handle pins the entry
/// against eviction; dropping it releases the pin. Cloning pins again.
pub struct ShardHandle {
    key: ShardKey,
    bytes: Arc<Vec<u8>>,
    inner: Arc<Mutex<CacheInner>>,
}

impl ShardHandle {
    pub fn key(&self) -> &ShardKey {
        &self.key
    }
}

impl Deref for ShardHandle {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl Clone for ShardHandle {
    fn clone(&self) -> Self {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get_mut(&self.key) {
            entry.pins += 1;
        }
        Self {
            key: self.key.clone(),
            bytes: Arc::clone(&self.bytes),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for ShardHandle {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get_mut(&self.key) {
            entry.pins = entry.pins.saturating_sub(1);
        }
    }
}
