//! Single-node end-to-end scenarios: a real WebAssembly identity job,
//! admission rejections, cancellation, and status reporting. With no
//! peers in the registry every chunk takes the local fallback.

mod util;

use std::sync::Arc;
use std::time::Duration;
use util::{spawn_node, stub_module};
use weft_common::OrchestratorEvent;
use weft_network::InMemoryNetwork;
use weft_protocol::{JobConfig, JobManifest, SplitStrategy, VerificationMode};
use weft_runtime::{FailureKind, JobState, ResultFetch};
use weft_sandbox::{StubSandbox, WasmSandbox};

/// Module implementing the guest contract: `run` echoes its input,
/// `merge` concatenates the length-prefixed items.
const IDENTITY_WAT: &str = r#"
(module
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))
  (func $ensure (param $end i32)
    block $done
      loop $again
        local.get $end
        memory.size
        i32.const 65536
        i32.mul
        i32.le_u
        br_if $done
        (if (i32.eq (memory.grow (i32.const 1)) (i32.const -1))
          (then unreachable))
        br $again
      end
    end)
  (func $alloc (export "alloc") (param $len i32) (result i32)
    (local $ptr i32)
    global.get $heap
    local.set $ptr
    local.get $ptr
    local.get $len
    i32.add
    global.set $heap
    global.get $heap
    call $ensure
    local.get $ptr)
  (func (export "run") (param $ptr i32) (param $len i32) (result i64)
    local.get $ptr
    i64.extend_i32_u
    i64.const 32
    i64.shl
    local.get $len
    i64.extend_i32_u
    i64.or)
  (func (export "merge") (param $ptr i32) (param $len i32) (result i64)
    (local $count i32) (local $i i32) (local $src i32)
    (local $out i32) (local $dst i32) (local $ilen i32)
    local.get $ptr
    i32.load
    local.set $count
    local.get $ptr
    i32.const 4
    i32.add
    local.set $src
    local.get $len
    call $alloc
    local.set $out
    local.get $out
    local.set $dst
    block $done
      loop $next
        local.get $i
        local.get $count
        i32.ge_u
        br_if $done
        local.get $src
        i32.load
        local.set $ilen
        local.get $src
        i32.const 4
        i32.add
        local.set $src
        local.get $dst
        local.get $src
        local.get $ilen
        memory.copy
        local.get $dst
        local.get $ilen
        i32.add
        local.set $dst
        local.get $src
        local.get $ilen
        i32.add
        local.set $src
        local.get $i
        i32.const 1
        i32.add
        local.set $i
        br $next
      end
    end
    local.get $out
    i64.extend_i32_u
    i64.const 32
    i64.shl
    local.get $dst
    local.get $out
    i32.sub
    i64.extend_i32_u
    i64.or)
)
"#;

/// `run` that never returns, for cancellation coverage.
const SPIN_WAT: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "alloc") (param i32) (result i32) i32.const 1024)
  (func (export "run") (param i32 i32) (result i64)
    loop $l br $l end
    i64.const 0)
  (func (export "merge") (param i32 i32) (result i64) i64.const 0)
)
"#;

fn wasm_node(hub: &Arc<InMemoryNetwork>) -> util::TestNode {
    spawn_node(
        hub,
        "solo",
        1.0,
        Arc::new(WasmSandbox::new().expect("wasm sandbox")),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn identity_job_finalizes_with_its_input() {
    let hub = InMemoryNetwork::new();
    let peer = wasm_node(&hub);

    let config = JobConfig {
        split: SplitStrategy::WholeInput,
        verification: VerificationMode::Hash,
        redundancy: 1,
        ..JobConfig::default()
    };
    let module = wat::parse_str(IDENTITY_WAT).unwrap();
    let job_id = peer
        .node
        .submit_job(JobManifest::new(module, b"hello".to_vec(), config))
        .unwrap();

    let result = peer.node.get_result(job_id, 10_000).await.unwrap();
    match result {
        ResultFetch::Ready(bytes) => assert_eq!(*bytes, b"hello".to_vec()),
        other => panic!("expected output, got {other:?}"),
    }

    let status = peer.node.get_status(job_id).unwrap();
    assert_eq!(status.state, JobState::Finalized);
    assert_eq!(status.total_chunks, 1);
    assert_eq!(status.completed_chunks, 1);
    assert!((status.progress - 1.0).abs() < f64::EPSILON);
    // Exactly one chunk ran, locally.
    assert_eq!(peer.run_count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn identity_job_under_merkle_verification() {
    let hub = InMemoryNetwork::new();
    let peer = wasm_node(&hub);

    let config = JobConfig {
        split: SplitStrategy::FixedChunk,
        min_chunk_bytes: 1,
        max_chunk_bytes: 4,
        verification: VerificationMode::Merkle,
        ..JobConfig::default()
    };
    let module = wat::parse_str(IDENTITY_WAT).unwrap();
    let input = b"abcdefghij".to_vec();
    let job_id = peer
        .node
        .submit_job(JobManifest::new(module, input.clone(), config))
        .unwrap();

    match peer.node.get_result(job_id, 10_000).await.unwrap() {
        ResultFetch::Ready(bytes) => assert_eq!(*bytes, input),
        other => panic!("expected output, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_module_is_rejected_at_admission() {
    let hub = InMemoryNetwork::new();
    let peer = wasm_node(&hub);

    let manifest = JobManifest::new(vec![], b"input".to_vec(), JobConfig::default());
    let err = peer.node.submit_job(manifest).unwrap_err();
    assert!(matches!(err, weft_common::CommonError::BadManifest(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn non_wasm_module_is_rejected_at_admission() {
    let hub = InMemoryNetwork::new();
    let peer = wasm_node(&hub);

    let manifest = JobManifest::new(
        b"definitely not wasm".to_vec(),
        b"input".to_vec(),
        JobConfig::default(),
    );
    let err = peer.node.submit_job(manifest).unwrap_err();
    assert!(matches!(err, weft_common::CommonError::BadManifest(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn admission_ceiling_rejects_with_no_capacity() {
    let hub = InMemoryNetwork::new();
    let cache_dir = tempfile::tempdir().unwrap();
    let config = weft_runtime::SystemConfig {
        max_outstanding_chunks: 0,
        ..weft_runtime::SystemConfig::for_testing(cache_dir.path())
    };
    let peer = util::spawn_node_with_config(
        &hub,
        "cramped",
        config,
        Arc::new(StubSandbox::identity()),
        cache_dir,
    );

    let manifest = JobManifest::new(stub_module("identity"), b"input".to_vec(), JobConfig::default());
    let err = peer.node.submit_job(manifest).unwrap_err();
    assert!(matches!(err, weft_common::CommonError::NoCapacity(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_transitions_to_cancelled_and_silences_results() {
    let hub = InMemoryNetwork::new();
    let peer = wasm_node(&hub);

    let config = JobConfig {
        // Generous deadline so the spin would otherwise run for a while.
        chunk_timeout_ms: 30_000,
        ..JobConfig::default()
    };
    let module = wat::parse_str(SPIN_WAT).unwrap();
    let job_id = peer
        .node
        .submit_job(JobManifest::new(module, b"x".to_vec(), config))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    peer.node.cancel_job(job_id).unwrap();

    match peer.node.get_result(job_id, 5_000).await.unwrap() {
        ResultFetch::Failed(info) => assert_eq!(info.kind, FailureKind::Cancelled),
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(peer.node.get_status(job_id).unwrap().state, JobState::Cancelled);

    // No chunk completion ever surfaced for the cancelled job.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        peer.observer
            .count_matching(|e| matches!(e, OrchestratorEvent::ChunkCompleted { .. })),
        0
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelling_unknown_job_is_not_found() {
    let hub = InMemoryNetwork::new();
    let peer = wasm_node(&hub);
    let err = peer.node.cancel_job(weft_common::JobId::generate()).unwrap_err();
    assert!(matches!(err, weft_common::CommonError::NotFound(_)));
}
