//! Multi-node delegation: a row-based word count across three peers,
//! module distribution by content hash, and the all-peers-unreachable
//! fallback.

mod util;

use std::sync::Arc;
use util::{link_mesh, spawn_node, stub_module, word_count_sandbox};
use weft_network::InMemoryNetwork;
use weft_protocol::{JobConfig, JobManifest, SplitStrategy, VerificationMode};
use weft_runtime::{JobState, ResultFetch};

fn word_count_config() -> JobConfig {
    JobConfig {
        split: SplitStrategy::RowBased,
        min_chunk_bytes: 1,
        max_chunk_bytes: 1024,
        verification: VerificationMode::Hash,
        redundancy: 1,
        ..JobConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn row_based_word_count_across_three_nodes() {
    let hub = InMemoryNetwork::new();
    // Threshold 0.0: every chunk delegates while peers are available.
    let manager = spawn_node(&hub, "node-a", 0.0, word_count_sandbox());
    let worker_b = spawn_node(&hub, "node-b", 0.0, word_count_sandbox());
    let worker_c = spawn_node(&hub, "node-c", 0.0, word_count_sandbox());
    // Only the manager knows the mesh; the workers know nobody, so every
    // delegated chunk executes one hop down.
    manager.node.ctx.registry.upsert_peer(worker_b.id.clone(), "mem");
    manager.node.ctx.registry.upsert_peer(worker_c.id.clone(), "mem");

    let input = b"a b c\nd e\nf".to_vec();
    let job_id = manager
        .node
        .submit_job(JobManifest::new(
            stub_module("word-count"),
            input,
            word_count_config(),
        ))
        .unwrap();

    match manager.node.get_result(job_id, 10_000).await.unwrap() {
        ResultFetch::Ready(bytes) => assert_eq!(*bytes, b"6".to_vec()),
        other => panic!("expected word count, got {other:?}"),
    }
    assert_eq!(manager.node.get_status(job_id).unwrap().state, JobState::Finalized);

    // At least one chunk ran on a remote peer.
    let remote_runs = worker_b.run_count() + worker_c.run_count();
    assert!(remote_runs >= 1, "no chunk was delegated remotely");
}

#[tokio::test(flavor = "multi_thread")]
async fn workers_pull_the_module_by_hash() {
    let hub = InMemoryNetwork::new();
    let manager = spawn_node(&hub, "node-a", 0.0, word_count_sandbox());
    let worker = spawn_node(&hub, "node-b", 0.0, word_count_sandbox());
    link_mesh(&[&manager, &worker]);

    let module = stub_module("word-count");
    let module_hash = weft_common::ContentHash::from_bytes(&module);
    // The worker has never seen this module.
    assert!(worker.node.ctx.module(&module_hash).is_none());

    let job_id = manager
        .node
        .submit_job(JobManifest::new(
            module,
            b"one two three".to_vec(),
            word_count_config(),
        ))
        .unwrap();
    match manager.node.get_result(job_id, 10_000).await.unwrap() {
        ResultFetch::Ready(bytes) => assert_eq!(*bytes, b"3".to_vec()),
        other => panic!("expected word count, got {other:?}"),
    }

    // The chunk ran remotely, so the worker pulled and cached the module.
    assert!(worker.run_count() >= 1);
    assert!(worker.node.ctx.module(&module_hash).is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn discovery_seeds_the_registry() {
    let hub = InMemoryNetwork::new();
    let manager = spawn_node(&hub, "node-a", 0.0, word_count_sandbox());
    let worker = spawn_node(&hub, "node-b", 0.0, word_count_sandbox());

    let discovery = weft_network::StaticDiscovery::new(vec![
        (manager.id.clone(), "mem://node-a".to_string()),
        (worker.id.clone(), "mem://node-b".to_string()),
    ]);
    manager.node.bootstrap_peers(&discovery, "weft-compute");

    // The node never registers itself; only the other peer lands in the
    // registry.
    assert_eq!(manager.node.ctx.registry.len(), 1);
    assert_eq!(manager.node.ctx.registry.trust(&worker.id), Some(0.5));

    let job_id = manager
        .node
        .submit_job(JobManifest::new(
            stub_module("word-count"),
            b"seeded mesh works".to_vec(),
            word_count_config(),
        ))
        .unwrap();
    match manager.node.get_result(job_id, 10_000).await.unwrap() {
        ResultFetch::Ready(bytes) => assert_eq!(*bytes, b"3".to_vec()),
        other => panic!("expected word count, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_mesh_falls_back_to_local_execution() {
    let hub = InMemoryNetwork::new();
    let manager = spawn_node(&hub, "node-a", 0.0, word_count_sandbox());
    let worker = spawn_node(&hub, "node-b", 0.0, word_count_sandbox());
    link_mesh(&[&manager, &worker]);
    // Every known peer is unreachable; the scheduler must run the whole
    // job locally rather than lose chunks.
    manager.node.ctx.registry.mark_unreachable(&worker.id);

    let job_id = manager
        .node
        .submit_job(JobManifest::new(
            stub_module("word-count"),
            b"alpha beta\ngamma".to_vec(),
            word_count_config(),
        ))
        .unwrap();

    match manager.node.get_result(job_id, 10_000).await.unwrap() {
        ResultFetch::Ready(bytes) => assert_eq!(*bytes, b"3".to_vec()),
        other => panic!("expected word count, got {other:?}"),
    }
    assert_eq!(worker.run_count(), 0);
    assert!(manager.run_count() >= 2);
}
