//! Shared helpers for the end-to-end scenarios: an in-process mesh of
//! nodes over the loopback transport, scripted sandbox behaviors, and a
//! counting wrapper to observe where chunks actually run.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use weft_common::{PeerId, RecordingObserver};
use weft_network::{InMemoryNetwork, Transport};
use weft_runtime::{MeshNode, SystemConfig};
use weft_sandbox::{
    decode_merge_input, CancelToken, EntryPoint, ExecutionLimits, ExecutionOutcome, Sandbox,
    SandboxError, StubSandbox,
};

/// One node in the test mesh, with its observer and execution counter.
pub struct TestNode {
    pub id: PeerId,
    pub node: Arc<MeshNode>,
    pub observer: Arc<RecordingObserver>,
    pub executions: Arc<AtomicUsize>,
    _cache_dir: tempfile::TempDir,
}

impl TestNode {
    pub fn run_count(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

/// Sandbox wrapper counting `run` invocations.
pub struct CountingSandbox {
    inner: Arc<dyn Sandbox>,
    runs: Arc<AtomicUsize>,
}

impl CountingSandbox {
    pub fn wrap(inner: Arc<dyn Sandbox>) -> (Arc<Self>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Self {
                inner,
                runs: Arc::clone(&runs),
            }),
            runs,
        )
    }
}

#[async_trait]
impl Sandbox for CountingSandbox {
    async fn execute(
        &self,
        module: &[u8],
        entry: EntryPoint,
        input: &[u8],
        limits: ExecutionLimits,
        cancel: CancelToken,
    ) -> Result<ExecutionOutcome, SandboxError> {
        if entry == EntryPoint::Run {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.execute(module, entry, input, limits, cancel).await
    }

    fn validate_module(&self, module: &[u8]) -> Result<(), SandboxError> {
        self.inner.validate_module(module)
    }
}

/// Spawn a node on the hub with the given sandbox behavior. A delegation
/// threshold of 0.0 makes any chunk delegate when peers exist; a huge one
/// keeps everything local.
pub fn spawn_node(
    hub: &Arc<InMemoryNetwork>,
    name: &str,
    delegation_threshold: f64,
    sandbox: Arc<dyn Sandbox>,
) -> TestNode {
    let cache_dir = tempfile::tempdir().expect("scratch cache dir");
    let config = SystemConfig {
        delegation_threshold,
        ..SystemConfig::for_testing(cache_dir.path())
    };
    spawn_node_with_config(hub, name, config, sandbox, cache_dir)
}

pub fn spawn_node_with_config(
    hub: &Arc<InMemoryNetwork>,
    name: &str,
    config: SystemConfig,
    sandbox: Arc<dyn Sandbox>,
    cache_dir: tempfile::TempDir,
) -> TestNode {
    let id = PeerId::from(name);
    let (sandbox, executions) = CountingSandbox::wrap(sandbox);
    let transport: Arc<dyn Transport> = Arc::new(hub.transport(id.clone()));
    let observer = Arc::new(RecordingObserver::new());
    let node = MeshNode::with_observer(
        id.clone(),
        config,
        transport,
        sandbox,
        Arc::clone(&observer) as Arc<dyn weft_common::EventObserver>,
    )
    .expect("node assembly");
    TestNode {
        id,
        node,
        observer,
        executions,
        _cache_dir: cache_dir,
    }
}

/// Make every node aware of every other node, with default capacity.
pub fn link_mesh(nodes: &[&TestNode]) {
    for a in nodes {
        for b in nodes {
            if a.id != b.id {
                a.node.ctx.registry.upsert_peer(b.id.clone(), "mem");
            }
        }
    }
}

/// `run` counts whitespace-separated words; `merge` sums the counts.
pub fn word_count_sandbox() -> Arc<dyn Sandbox> {
    Arc::new(StubSandbox::new(
        |input| {
            let text = String::from_utf8_lossy(input);
            Ok(text.split_whitespace().count().to_string().into_bytes())
        },
        |input| {
            let items = decode_merge_input(input)?;
            let mut total: u64 = 0;
            for item in items {
                let text = String::from_utf8_lossy(&item);
                total += text.trim().parse::<u64>().map_err(|e| {
                    SandboxError::Trap(format!("merge input is not a count: {e}"))
                })?;
            }
            Ok(total.to_string().into_bytes())
        },
    ))
}

/// `run` reverses the chunk bytes; `merge` concatenates.
pub fn byte_reverse_sandbox() -> Arc<dyn Sandbox> {
    Arc::new(StubSandbox::new(
        |input| Ok(input.iter().rev().copied().collect()),
        |input| decode_merge_input(input).map(|items| items.concat()),
    ))
}

/// Returns `[0xFF]` for any input, with a correct hash over the wrong
/// bytes: invisible to hash verification, caught by redundancy.
pub fn liar_sandbox() -> Arc<dyn Sandbox> {
    Arc::new(StubSandbox::new(
        |_input| Ok(vec![0xFF]),
        |input| decode_merge_input(input).map(|items| items.concat()),
    ))
}

/// Opaque module tag for stub-sandbox jobs.
pub fn stub_module(tag: &str) -> Vec<u8> {
    format!("stub-module:{tag}").into_bytes()
}
