//! Deadline handling: a slow worker misses the per-chunk deadline, the
//! chunk is reassigned, and the job still finalizes.

mod util;

use std::sync::Arc;
use std::time::Duration;
use util::{spawn_node, stub_module};
use weft_common::OrchestratorEvent;
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

fn slow_echo_sandbox(delay: Duration) -> Arc<dyn Sandbox> {
    Arc::new(
        StubSandbox::new(
            |input| Ok(input.to_vec()),
            |input| decode_merge_input(input).map(|items| items.concat()),
        )
        .with_delay(delay),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_worker_times_out_and_chunk_is_reassigned() {
    let hub = InMemoryNetwork::new();
    let manager = spawn_node(&hub, "node-m", 0.0, echo_sandbox());
    // "node-a-slow" sorts first so the first attempt lands on it; it
    // sleeps a second, far past the 200 ms deadline.
    let slow = spawn_node(&hub, "node-a-slow", 1e12, slow_echo_sandbox(Duration::from_secs(1)));
    let fast = spawn_node(&hub, "node-b-fast", 1e12, echo_sandbox());
    manager.node.ctx.registry.upsert_peer(slow.id.clone(), "mem");
    manager.node.ctx.registry.upsert_peer(fast.id.clone(), "mem");

    let config = JobConfig {
        split: SplitStrategy::WholeInput,
        verification: VerificationMode::Hash,
        redundancy: 1,
        chunk_timeout_ms: 200,
        retry_budget: 2,
        ..JobConfig::default()
    };
    let job_id = manager
        .node
        .submit_job(JobManifest::new(
            stub_module("echo"),
            b"payload".to_vec(),
            config,
        ))
        .unwrap();

    match manager.node.get_result(job_id, 10_000).await.unwrap() {
        ResultFetch::Ready(bytes) => assert_eq!(*bytes, b"payload".to_vec()),
        other => panic!("expected echoed payload, got {other:?}"),
    }
    assert_eq!(manager.node.get_status(job_id).unwrap().state, JobState::Finalized);

    // The retry ran on the fast worker after the slow one missed the
    // deadline.
    assert!(fast.run_count() >= 1, "retry never reached the fast worker");
    let timeouts = manager.observer.count_matching(|e| {
        matches!(e, OrchestratorEvent::AssignmentTimedOut { .. })
    });
    let slow_trust = manager.node.ctx.registry.trust(&slow.id).unwrap();
    // Either the deadline tick or the worker's own wall-limit report
    // marks the slow attempt; both cost the slow peer trust.
    assert!(
        timeouts >= 1 || slow_trust < 0.5,
        "slow worker was never penalized (timeouts={timeouts}, trust={slow_trust})"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn chunk_fails_after_retry_budget_is_exhausted() {
    let hub = InMemoryNetwork::new();
    let manager = spawn_node(&hub, "node-m", 1e12, failing_sandbox());

    let config = JobConfig {
        split: SplitStrategy::WholeInput,
        verification: VerificationMode::Hash,
        retry_budget: 1,
        chunk_timeout_ms: 1_000,
        ..JobConfig::default()
    };
    let job_id = manager
        .node
        .submit_job(JobManifest::new(
            stub_module("always-fails"),
            b"doomed".to_vec(),
            config,
        ))
        .unwrap();

    match manager.node.get_result(job_id, 10_000).await.unwrap() {
        ResultFetch::Failed(info) => {
            assert_eq!(info.kind, weft_runtime::FailureKind::ChunkRetriesExhausted);
            assert_eq!(info.failed_chunks, vec![0]);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(manager.node.get_status(job_id).unwrap().state, JobState::Failed);
    // Initial attempt plus one retry.
    assert_eq!(manager.run_count(), 2);
}

fn failing_sandbox() -> Arc<dyn Sandbox> {
    Arc::new(StubSandbox::new(
        |_input| Err(weft_sandbox::SandboxError::Trap("boom".to_string())),
        |input| decode_merge_input(input).map(|items| items.concat()),
    ))
}
