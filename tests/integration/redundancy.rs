//! Redundant execution: a dishonest worker is outvoted by the honest
//! majority and pays for it in trust, and a forged result hash is
//! rejected outright.

mod util;

use async_trait::async_trait;
use std::sync::Arc;
use util::{byte_reverse_sandbox, liar_sandbox, spawn_node, stub_module};
use weft_common::{ContentHash, OrchestratorEvent, PeerId};
use weft_network::{InMemoryNetwork, MessageHandler, Transport, TransportError};
use weft_protocol::{
    DelegationAck, JobConfig, JobManifest, MessagePayload, ResultAck, SplitStrategy,
    TaskResultMessage, TaskStatus, VerificationMode, WireMessage,
};
use weft_runtime::{JobState, ResultFetch};

fn reverse_config(redundancy: u32) -> JobConfig {
    JobConfig {
        split: SplitStrategy::WholeInput,
        verification: VerificationMode::Hash,
        redundancy,
        ..JobConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn honest_majority_outvotes_one_liar() {
    let hub = InMemoryNetwork::new();
    let manager = spawn_node(&hub, "node-m", 0.0, byte_reverse_sandbox());
    let honest_1 = spawn_node(&hub, "node-w1", 0.0, byte_reverse_sandbox());
    let honest_2 = spawn_node(&hub, "node-w2", 0.0, byte_reverse_sandbox());
    let liar = spawn_node(&hub, "node-w3-liar", 0.0, liar_sandbox());
    for worker in [&honest_1, &honest_2, &liar] {
        manager.node.ctx.registry.upsert_peer(worker.id.clone(), "mem");
    }

    let job_id = manager
        .node
        .submit_job(JobManifest::new(
            stub_module("byte-reverse"),
            vec![0x01, 0x02, 0x03],
            reverse_config(3),
        ))
        .unwrap();

    match manager.node.get_result(job_id, 10_000).await.unwrap() {
        ResultFetch::Ready(bytes) => assert_eq!(*bytes, vec![0x03, 0x02, 0x01]),
        other => panic!("expected reversed bytes, got {other:?}"),
    }
    assert_eq!(manager.node.get_status(job_id).unwrap().state, JobState::Finalized);

    // The liar's trust dropped from the 0.5 bootstrap by the full
    // verification penalty; the honest workers gained a little.
    let liar_trust = manager.node.ctx.registry.trust(&liar.id).unwrap();
    assert!(liar_trust <= 0.2 + 1e-9, "liar trust is {liar_trust}");
    for honest in [&honest_1, &honest_2] {
        let trust = manager.node.ctx.registry.trust(&honest.id).unwrap();
        assert!(trust > 0.5, "honest trust is {trust}");
    }
}

/// A peer that accepts chunks and returns a payload whose claimed hash
/// does not match the bytes.
struct ForgingWorker {
    id: PeerId,
    transport: Arc<dyn Transport>,
}

#[async_trait]
impl MessageHandler for ForgingWorker {
    async fn handle(
        &self,
        from: PeerId,
        message: WireMessage,
    ) -> Result<WireMessage, TransportError> {
        match message.payload {
            MessagePayload::DelegateTask(request) => {
                let transport = Arc::clone(&self.transport);
                let worker = self.id.clone();
                tokio::spawn(async move {
                    let forged = TaskResultMessage {
                        job_id: request.job_id,
                        chunk_index: request.chunk_index,
                        worker: worker.clone(),
                        attempt: request.attempt,
                        payload: Some(b"forged payload".to_vec()),
                        result_hash: Some(ContentHash::from_bytes(b"some other bytes")),
                        merkle_proof: None,
                        duration_ms: 1,
                        status: TaskStatus::Ok,
                        error: None,
                    };
                    let message = WireMessage::new(
                        MessagePayload::ReturnTaskResult(forged),
                        worker,
                    );
                    let _ = transport.send(&from, message).await;
                });
                Ok(WireMessage::new(
                    MessagePayload::DelegateAck(DelegationAck {
                        accepted: true,
                        est_ms: 1,
                    }),
                    self.id.clone(),
                ))
            }
            MessagePayload::AbortJob(_) => Ok(WireMessage::new(
                MessagePayload::ResultAck(ResultAck { accepted: true }),
                self.id.clone(),
            )),
            other => Err(TransportError::UnsupportedMessage {
                message_type: other.message_type(),
            }),
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn forged_hash_is_rejected_and_chunk_is_retried_elsewhere() {
    let hub = InMemoryNetwork::new();
    let manager = spawn_node(&hub, "node-m", 0.0, byte_reverse_sandbox());
    let honest = spawn_node(&hub, "node-w-honest", 0.0, byte_reverse_sandbox());

    // "node-a-forger" sorts first, so the tie-broken selection tries it
    // before the honest worker.
    let forger_id = PeerId::from("node-a-forger");
    let forger_transport: Arc<dyn Transport> = Arc::new(hub.transport(forger_id.clone()));
    forger_transport.set_handler(Arc::new(ForgingWorker {
        id: forger_id.clone(),
        transport: Arc::clone(&forger_transport),
    }));

    manager.node.ctx.registry.upsert_peer(forger_id.clone(), "mem");
    manager.node.ctx.registry.upsert_peer(honest.id.clone(), "mem");

    let job_id = manager
        .node
        .submit_job(JobManifest::new(
            stub_module("byte-reverse"),
            vec![0x0A, 0x0B],
            reverse_config(1),
        ))
        .unwrap();

    match manager.node.get_result(job_id, 10_000).await.unwrap() {
        ResultFetch::Ready(bytes) => assert_eq!(*bytes, vec![0x0B, 0x0A]),
        other => panic!("expected reversed bytes, got {other:?}"),
    }

    // The forged result never became a chunk output; the forger paid the
    // verification penalty and the honest worker served the retry.
    assert!(
        manager
            .observer
            .count_matching(|e| matches!(e, OrchestratorEvent::VerificationRejected { .. }))
            >= 1
    );
    let forger_trust = manager.node.ctx.registry.trust(&forger_id).unwrap();
    assert!(forger_trust <= 0.2 + 1e-9, "forger trust is {forger_trust}");
    assert!(honest.run_count() >= 1);
}
