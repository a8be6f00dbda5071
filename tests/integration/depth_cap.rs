//! Delegation depth bound: with `max_delegation_depth = 2` a chunk may
//! travel manager → worker → sub-worker, but the peer at depth 2 must
//! execute locally no matter how attractive further delegation looks.

mod util;

use std::sync::Arc;
use util::{spawn_node, stub_module};
use weft_network::InMemoryNetwork;
use weft_protocol::{JobConfig, JobManifest, SplitStrategy, VerificationMode};
use weft_runtime::{JobState, ResultFetch};
use weft_sandbox::{decode_merge_input, Sandbox, StubSandbox};

fn echo_sandbox() -> Arc<dyn Sandbox> {
    Arc::new(StubSandbox::new(
        |input| Ok(input.to_vec()),
        |input| decode_merge_input(input).map(|items| items.concat()),
    ))
}

#[tokio::test(flavor = "multi_thread")]
async fn chunk_executes_at_the_depth_bound_and_never_below() {
    let hub = InMemoryNetwork::new();
    // Threshold 0.0 everywhere: every peer would delegate forever if the
    // depth bound did not stop the recursion.
    let manager = spawn_node(&hub, "node-m", 0.0, echo_sandbox());
    let middle = spawn_node(&hub, "node-w1", 0.0, echo_sandbox());
    let deep = spawn_node(&hub, "node-w2", 0.0, echo_sandbox());
    let beyond = spawn_node(&hub, "node-w3", 0.0, echo_sandbox());

    // A chain: the manager knows only w1, w1 knows only w2, w2 knows
    // only w3. Without the bound the chunk would keep hopping.
    manager.node.ctx.registry.upsert_peer(middle.id.clone(), "mem");
    middle.node.ctx.registry.upsert_peer(deep.id.clone(), "mem");
    deep.node.ctx.registry.upsert_peer(beyond.id.clone(), "mem");

    let config = JobConfig {
        split: SplitStrategy::WholeInput,
        verification: VerificationMode::Hash,
        max_delegation_depth: 2,
        chunk_timeout_ms: 5_000,
        ..JobConfig::default()
    };
    let job_id = manager
        .node
        .submit_job(JobManifest::new(
            stub_module("echo"),
            b"deep payload".to_vec(),
            config,
        ))
        .unwrap();

    match manager.node.get_result(job_id, 10_000).await.unwrap() {
        ResultFetch::Ready(bytes) => assert_eq!(*bytes, b"deep payload".to_vec()),
        other => panic!("expected echoed payload, got {other:?}"),
    }
    assert_eq!(manager.node.get_status(job_id).unwrap().state, JobState::Finalized);

    // The chunk ran exactly once, on the peer at depth 2. Nothing was
    // dispatched past the bound.
    assert_eq!(manager.run_count(), 0, "manager should not execute");
    assert_eq!(middle.run_count(), 0, "depth-1 peer should relay, not run");
    assert_eq!(deep.run_count(), 1, "depth-2 peer must execute locally");
    assert_eq!(beyond.run_count(), 0, "no chunk may reach depth 3");
}

#[tokio::test(flavor = "multi_thread")]
async fn depth_zero_cap_forces_the_manager_to_run_locally() {
    let hub = InMemoryNetwork::new();
    let manager = spawn_node(&hub, "node-m", 0.0, echo_sandbox());
    let worker = spawn_node(&hub, "node-w", 0.0, echo_sandbox());
    manager.node.ctx.registry.upsert_peer(worker.id.clone(), "mem");

    let config = JobConfig {
        split: SplitStrategy::WholeInput,
        verification: VerificationMode::Hash,
        max_delegation_depth: 0,
        ..JobConfig::default()
    };
    let job_id = manager
        .node
        .submit_job(JobManifest::new(
            stub_module("echo"),
            b"stay home".to_vec(),
            config,
        ))
        .unwrap();

    match manager.node.get_result(job_id, 10_000).await.unwrap() {
        ResultFetch::Ready(bytes) => assert_eq!(*bytes, b"stay home".to_vec()),
        other => panic!("expected echoed payload, got {other:?}"),
    }
    assert_eq!(manager.run_count(), 1);
    assert_eq!(worker.run_count(), 0);
}
