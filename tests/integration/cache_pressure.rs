//! Shard cache behavior under pressure: a 1 MiB cap with six 256 KiB
//! inserts stays under the cap by evicting from the cold end, and misses
//! on evicted keys never count as hits.

use std::sync::Arc;
use weft_cache::{InMemoryManifestStore, ShardCache, ShardKey};
use weft_common::JobId;

fn key(job_id: JobId, index: u32) -> ShardKey {
    ShardKey::Chunk { job_id, index }
}

#[tokio::test]
async fn six_large_inserts_stay_under_the_cap() {
    let cache = ShardCache::new(1024 * 1024, Arc::new(InMemoryManifestStore::new()));
    let job_id = JobId::generate();
    let shard = vec![0u8; 256 * 1024];

    for i in 0..6 {
        cache.put_shard(key(job_id, i), shard.clone()).unwrap();
        assert!(
            cache.stats().total_bytes <= 1024 * 1024,
            "cap exceeded after insert {i}"
        );
    }

    // The earliest inserts were evicted from the cold end; the newest
    // insert is resident.
    assert!(!cache.contains(&key(job_id, 0)));
    assert!(cache.contains(&key(job_id, 5)));

    // A lookup of an evicted key is a miss and leaves the hit counter
    // untouched.
    let hits_before = cache.stats().hits;
    assert!(cache.get_shard(&key(job_id, 0)).is_none());
    let stats = cache.stats();
    assert_eq!(stats.hits, hits_before);
    assert!(stats.misses >= 1);
}

#[tokio::test]
async fn recently_used_shards_survive_the_pressure() {
    let cache = ShardCache::new(1024 * 1024, Arc::new(InMemoryManifestStore::new()));
    let job_id = JobId::generate();
    let shard = vec![0u8; 256 * 1024];

    for i in 0..3 {
        cache.put_shard(key(job_id, i), shard.clone()).unwrap();
    }
    // Keep shard 0 hot; shard 1 is now the coldest.
    let _ = cache.get_shard(&key(job_id, 0));

    cache.put_shard(key(job_id, 3), shard.clone()).unwrap();

    assert!(cache.contains(&key(job_id, 0)));
    assert!(!cache.contains(&key(job_id, 1)));
}

#[tokio::test]
async fn pinned_shard_blocks_eviction_until_released() {
    let cache = ShardCache::new(600 * 1024, Arc::new(InMemoryManifestStore::new()));
    let job_id = JobId::generate();
    let shard = vec![0u8; 256 * 1024];

    cache.put_shard(key(job_id, 0), shard.clone()).unwrap();
    let pin = cache.get_shard(&key(job_id, 0)).unwrap();
    cache.put_shard(key(job_id, 1), shard.clone()).unwrap();

    // Shard 0 is the coldest by rank but pinned; shard 1 goes instead.
    cache.put_shard(key(job_id, 2), shard.clone()).unwrap();
    assert!(cache.contains(&key(job_id, 0)));
    assert!(!cache.contains(&key(job_id, 1)));

    drop(pin);
    cache.put_shard(key(job_id, 3), shard.clone()).unwrap();
    assert!(cache.contains(&key(job_id, 3)));
}
