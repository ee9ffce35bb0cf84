//! Multi-node pipeline scenarios driven as an in-process cluster.
//!
//! Nodes are wired by draining each node's outbound channel and handing
//! the messages to every other node, preserving per-sender order.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use veriqos_committee::{CommitteeConfig, CommitteeNode, IngestOutcome, Outbound};
use veriqos_core::{
    now_millis, AudioQualityData, EventKind, MediaSpecs, MemoryEventSink, QoSProof, TaskState,
    VideoQualityData,
};
use veriqos_crypto::{Ed25519Scheme, Keyring};

struct Cluster {
    nodes: Vec<CommitteeNode>,
    outboxes: Vec<mpsc::UnboundedReceiver<Outbound>>,
    sinks: Vec<Arc<MemoryEventSink>>,
}

impl Cluster {
    /// Build a committee of `n` nodes; node 0 is the leader.
    fn new(n: usize) -> Self {
        let mut nodes = Vec::new();
        let mut outboxes = Vec::new();
        let mut sinks = Vec::new();
        for i in 0..n {
            let sink = Arc::new(MemoryEventSink::new());
            let keyring = Arc::new(Keyring::generate(Arc::new(Ed25519Scheme::new())));
            let (node, outbox) = CommitteeNode::new(
                CommitteeConfig {
                    node_id: format!("node-{}", i),
                    is_leader: i == 0,
                    total_nodes: n,
                },
                keyring,
                sink.clone(),
            );
            nodes.push(node);
            outboxes.push(outbox);
            sinks.push(sink);
        }
        Self {
            nodes,
            outboxes,
            sinks,
        }
    }

    fn leader(&self) -> &CommitteeNode {
        &self.nodes[0]
    }

    /// Deliver queued outbound messages until the cluster goes quiet.
    fn run_until_quiet(&mut self) {
        loop {
            let mut delivered = false;
            for sender in 0..self.nodes.len() {
                while let Ok(outbound) = self.outboxes[sender].try_recv() {
                    delivered = true;
                    match outbound {
                        Outbound::Broadcast(message) => {
                            for (target, node) in self.nodes.iter().enumerate() {
                                if target != sender {
                                    node.handle_message(message.clone());
                                }
                            }
                        }
                        Outbound::Direct { to, message } => {
                            if let Some(node) =
                                self.nodes.iter().find(|n| n.node_id() == to)
                            {
                                node.handle_message(message.clone());
                            }
                        }
                    }
                }
            }
            if !delivered {
                break;
            }
        }
    }

    /// Submit a proof to a subset of nodes.
    fn submit_to(&self, indices: &[usize], proof: &QoSProof) {
        for &i in indices {
            let outcome = self.nodes[i].ingest_proof(proof.clone());
            assert!(
                matches!(outcome, IngestOutcome::Accepted { .. }),
                "node {} rejected proof from {}: {:?}",
                i,
                proof.verifier_id,
                outcome
            );
        }
    }

    fn submit_to_all(&self, proof: &QoSProof) {
        let indices: Vec<usize> = (0..self.nodes.len()).collect();
        self.submit_to(&indices, proof);
    }

    fn submit_supplementary_to_all(&self, task_id: &str, proof: &QoSProof) {
        for node in &self.nodes {
            node.ingest_supplementary(task_id, proof.clone()).unwrap();
        }
    }

    /// Assert the bookkeeping invariants on every node's view of a task.
    fn assert_invariants(&self, task_id: &str) {
        for node in &self.nodes {
            if let Some(status) = node.task_status(task_id) {
                assert_eq!(
                    status.proof_count,
                    status.verifier_ids.len(),
                    "proof_count must match verifier set on {}",
                    node.node_id()
                );
                let mut deduped = status.verifier_ids.clone();
                deduped.sort();
                deduped.dedup();
                assert_eq!(
                    deduped.len(),
                    status.verifier_ids.len(),
                    "verifier ids must be unique on {}",
                    node.node_id()
                );
            }
        }
    }
}

fn proof(task: &str, verifier: &str) -> QoSProof {
    QoSProof {
        task_id: task.into(),
        verifier_id: verifier.into(),
        timestamp: now_millis() - 1_000,
        media_specs: MediaSpecs {
            codec: "H.264".into(),
            width: 1920,
            height: 1080,
            bitrate: 5000.0,
            has_audio: true,
        },
        video_quality_data: VideoQualityData {
            overall_score: 85.5,
            gop_scores: BTreeMap::from([("0".into(), "86.2".into())]),
        },
        audio_quality_data: Some(AudioQualityData { overall_score: 92.0 }),
        sync_quality_data: None,
        signature: format!("sig-{}", verifier),
        id: None,
        supplementary_info: None,
    }
}

fn proof_with_codec(task: &str, verifier: &str, codec: &str) -> QoSProof {
    let mut p = proof(task, verifier);
    p.media_specs.codec = codec.into();
    p
}

fn proof_with_bitrate(task: &str, verifier: &str, bitrate: f64) -> QoSProof {
    let mut p = proof(task, verifier);
    p.media_specs.bitrate = bitrate;
    p
}

#[test]
fn happy_path_four_nodes_finalize() {
    let mut cluster = Cluster::new(4);
    cluster.submit_to_all(&proof("task-A", "v1"));
    cluster.submit_to_all(&proof("task-A", "v2"));
    cluster.run_until_quiet();

    for node in &cluster.nodes {
        assert_eq!(
            node.task_state("task-A"),
            Some(TaskState::Finalized),
            "node {} did not finalize",
            node.node_id()
        );
        assert_eq!(node.completed_sequences(), vec![1]);
        assert!(!node.processing_consensus());
        let status = node.task_status("task-A").unwrap();
        assert!(status.result.is_some());
    }
    cluster.assert_invariants("task-A");

    // The leader recorded the normal consensus event.
    assert!(cluster.sinks[0]
        .kinds_for_task("task-A")
        .contains(&EventKind::ConsensusReachNormal));
}

#[test]
fn duplicate_verifier_is_dropped() {
    let cluster = Cluster::new(4);
    let first = cluster.nodes[1].ingest_proof(proof("task-A", "v1"));
    assert!(matches!(first, IngestOutcome::Accepted { .. }));

    let dup = cluster.nodes[1].ingest_proof(proof("task-A", "v1"));
    assert!(matches!(dup, IngestOutcome::Duplicate { .. }));

    let status = cluster.nodes[1].task_status("task-A").unwrap();
    assert_eq!(status.proof_count, 1);
    assert_eq!(status.verifier_ids, vec!["v1"]);
}

#[test]
fn malformed_proof_leaves_no_task_state() {
    let cluster = Cluster::new(4);
    let mut bad = proof("task-A", "v1");
    bad.video_quality_data.gop_scores.clear();

    let outcome = cluster.leader().ingest_proof(bad);
    assert!(matches!(outcome, IngestOutcome::Rejected { .. }));
    assert!(cluster.leader().task_status("task-A").is_none());
}

#[test]
fn structural_conflict_with_three_way_split_needs_manual_review() {
    let mut cluster = Cluster::new(4);
    cluster.submit_to_all(&proof_with_codec("task-B", "v1", "H.264"));
    cluster.submit_to_all(&proof_with_codec("task-B", "v2", "H.265"));
    cluster.run_until_quiet();

    for node in &cluster.nodes {
        assert_eq!(
            node.task_state("task-B"),
            Some(TaskState::AwaitingSupplementary),
            "node {} should be awaiting a supplementary attestation",
            node.node_id()
        );
    }

    // A supplementary that agrees with neither verifier leaves no
    // majority.
    cluster.submit_supplementary_to_all("task-B", &proof_with_codec("task-B", "v3", "VP9"));
    cluster.run_until_quiet();

    assert_eq!(
        cluster.leader().task_state("task-B"),
        Some(TaskState::NeedsManualReview)
    );
}

#[test]
fn structural_conflict_resolved_by_majority_finalizes() {
    let mut cluster = Cluster::new(4);
    cluster.submit_to_all(&proof_with_codec("task-C", "v1", "H.264"));
    cluster.submit_to_all(&proof_with_codec("task-C", "v2", "H.265"));
    cluster.run_until_quiet();

    for node in &cluster.nodes {
        assert_eq!(node.task_state("task-C"), Some(TaskState::AwaitingSupplementary));
        let status = node.task_status("task-C").unwrap();
        let info = status.validation_info.unwrap();
        assert!(info.supplementary_requested);
        assert!(info.conflict_details.is_some());
    }

    cluster.submit_supplementary_to_all("task-C", &proof_with_codec("task-C", "v3", "H.264"));
    cluster.run_until_quiet();

    let mut finalized = 0;
    for node in &cluster.nodes {
        if node.task_state("task-C") == Some(TaskState::Finalized) {
            finalized += 1;
        }
    }
    assert!(
        finalized >= 3,
        "expected a quorum of nodes finalized, got {}",
        finalized
    );

    let status = cluster.leader().task_status("task-C").unwrap();
    let resolved = status
        .validation_info
        .unwrap()
        .resolved_result
        .expect("resolution recorded");
    assert_eq!(resolved["resolvedBy"], "majority");
    assert_eq!(resolved["majorityValue"], "H.264");
    let reliable: Vec<String> = resolved["reliableVerifiers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(reliable, vec!["v1", "v3"]);
    let unreliable: Vec<String> = resolved["unreliableVerifiers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(unreliable, vec!["v2"]);

    // Two sequences completed on the leader: the conflict round and the
    // final round.
    assert_eq!(cluster.leader().completed_sequences(), vec![1, 2]);
}

#[test]
fn score_conflict_resolved_statistically_finalizes() {
    let mut cluster = Cluster::new(4);
    // 5000 vs 6000: 9.1% deviation from the mean, a score conflict.
    cluster.submit_to_all(&proof_with_bitrate("task-D", "v1", 5000.0));
    cluster.submit_to_all(&proof_with_bitrate("task-D", "v2", 6000.0));
    cluster.run_until_quiet();

    for node in &cluster.nodes {
        assert_eq!(node.task_state("task-D"), Some(TaskState::AwaitingSupplementary));
    }

    cluster.submit_supplementary_to_all("task-D", &proof_with_bitrate("task-D", "v3", 5100.0));
    cluster.run_until_quiet();

    assert_eq!(cluster.leader().task_state("task-D"), Some(TaskState::Finalized));

    let status = cluster.leader().task_status("task-D").unwrap();
    let resolved = status.validation_info.unwrap().resolved_result.unwrap();
    assert_eq!(resolved["resolvedBy"], "statistical");
    assert_eq!(resolved["medianValue"], 5100.0);
    let unreliable: Vec<&str> = resolved["unreliableVerifiers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(unreliable, vec!["v2"]);
}

#[test]
fn byzantine_tolerance_with_two_silent_followers() {
    // N=7, quorum 5: the leader and four followers see both proofs; two
    // followers never receive attestations at all.
    let mut cluster = Cluster::new(7);
    let active = [0usize, 1, 2, 3, 4];
    cluster.submit_to(&active, &proof("task-E", "v1"));
    cluster.submit_to(&active, &proof("task-E", "v2"));
    cluster.run_until_quiet();

    for &i in &active {
        assert_eq!(
            cluster.nodes[i].task_state("task-E"),
            Some(TaskState::Finalized),
            "active node {} should finalize",
            i
        );
    }
    // The starved followers never entered consensus.
    for &i in &[5usize, 6] {
        let state = cluster.nodes[i].task_state("task-E");
        assert!(
            state.is_none(),
            "starved node {} should hold no task record, got {:?}",
            i,
            state
        );
        assert!(cluster.nodes[i].completed_sequences().is_empty());
    }
}

#[test]
fn insufficient_follower_proofs_stall_consensus() {
    // N=4, quorum 3: only the leader and one follower hold two proofs;
    // the other two followers hold one each and buffer the pre-prepare.
    let mut cluster = Cluster::new(4);
    cluster.submit_to(&[0, 1], &proof("task-F", "v1"));
    cluster.submit_to(&[0, 1, 2], &proof("task-F", "v2"));
    cluster.submit_to(&[3], &proof("task-F", "v1"));
    cluster.run_until_quiet();

    for node in &cluster.nodes {
        assert_ne!(
            node.task_state("task-F"),
            Some(TaskState::Finalized),
            "node {} must not finalize without quorum",
            node.node_id()
        );
    }
    // The leader keeps the consensus window open on the stuck round.
    assert_eq!(cluster.leader().task_state("task-F"), Some(TaskState::Consensus));
    assert!(cluster.leader().processing_consensus());
}

#[test]
fn supplementary_timeout_routes_to_manual_review() {
    let mut cluster = Cluster::new(4);
    cluster.submit_to_all(&proof_with_codec("task-G", "v1", "H.264"));
    cluster.submit_to_all(&proof_with_codec("task-G", "v2", "H.265"));
    cluster.run_until_quiet();
    assert_eq!(
        cluster.leader().task_state("task-G"),
        Some(TaskState::AwaitingSupplementary)
    );

    // Force the two-hour check without waiting.
    assert!(cluster.leader().check_supplementary_timeout("task-G"));
    assert_eq!(
        cluster.leader().task_state("task-G"),
        Some(TaskState::NeedsManualReview)
    );
    let status = cluster.leader().task_status("task-G").unwrap();
    let reason = status.validation_info.unwrap().timeout_reason.unwrap();
    assert!(reason.contains("timeout"));

    // The check is idempotent.
    assert!(!cluster.leader().check_supplementary_timeout("task-G"));
}

#[test]
fn final_round_waits_for_ack_quorum() {
    // Quorum 3 in a 4-node committee: the leader's own readiness plus
    // two follower acks gate the final round.
    let mut cluster = Cluster::new(4);
    cluster.submit_to_all(&proof_with_codec("task-H", "v1", "H.264"));
    cluster.submit_to_all(&proof_with_codec("task-H", "v2", "H.265"));
    cluster.run_until_quiet();

    let supp = proof_with_codec("task-H", "v3", "H.264");
    cluster.leader().ingest_supplementary("task-H", supp.clone()).unwrap();
    cluster.nodes[1].ingest_supplementary("task-H", supp.clone()).unwrap();
    cluster.run_until_quiet();

    // One ack (plus the leader itself) is short of quorum.
    assert_eq!(cluster.leader().task_state("task-H"), Some(TaskState::Validated));

    cluster.nodes[2].ingest_supplementary("task-H", supp).unwrap();
    cluster.run_until_quiet();
    assert_eq!(cluster.leader().task_state("task-H"), Some(TaskState::Finalized));
}

#[test]
fn invalid_supplementary_fails_the_task() {
    let mut cluster = Cluster::new(4);
    cluster.submit_to_all(&proof_with_codec("task-I", "v1", "H.264"));
    cluster.submit_to_all(&proof_with_codec("task-I", "v2", "H.265"));
    cluster.run_until_quiet();

    let mut bad = proof_with_codec("task-I", "v3", "H.264");
    bad.signature.clear();
    cluster.leader().ingest_supplementary("task-I", bad).unwrap();

    assert_eq!(cluster.leader().task_state("task-I"), Some(TaskState::Failed));
    let status = cluster.leader().task_status("task-I").unwrap();
    assert!(status
        .validation_info
        .unwrap()
        .error_message
        .unwrap()
        .contains("supplementary proof invalid"));
}

#[test]
fn supplementary_rejected_outside_awaiting_state() {
    let cluster = Cluster::new(4);
    let err = cluster
        .leader()
        .ingest_supplementary("task-missing", proof("task-missing", "v3"))
        .unwrap_err();
    assert!(err.to_string().contains("Unknown task"));

    cluster.leader().ingest_proof(proof("task-J", "v1"));
    let err = cluster
        .leader()
        .ingest_supplementary("task-J", proof("task-J", "v3"))
        .unwrap_err();
    assert!(err.to_string().contains("not awaiting"));
}

#[test]
fn pre_prepare_buffered_until_proofs_arrive() {
    // The leader races ahead: followers receive the pre-prepare before
    // any attestation. Ingesting the proofs replays the buffered message
    // and the round completes.
    let mut cluster = Cluster::new(4);
    cluster.submit_to(&[0], &proof("task-K", "v1"));
    cluster.submit_to(&[0], &proof("task-K", "v2"));
    cluster.run_until_quiet();

    // Only the leader has the proofs so far; nothing finalized.
    assert_eq!(cluster.leader().task_state("task-K"), Some(TaskState::Consensus));
    for i in 1..4 {
        assert_ne!(cluster.nodes[i].task_state("task-K"), Some(TaskState::Finalized));
    }

    for i in 1..4 {
        cluster.submit_to(&[i], &proof("task-K", "v1"));
        cluster.submit_to(&[i], &proof("task-K", "v2"));
    }
    cluster.run_until_quiet();

    for node in &cluster.nodes {
        assert_eq!(
            node.task_state("task-K"),
            Some(TaskState::Finalized),
            "node {} should finalize after replaying the buffered pre-prepare",
            node.node_id()
        );
    }
}

#[test]
fn serial_queue_processes_tasks_one_at_a_time() {
    // A single-node committee (quorum 1) finalizes synchronously, so
    // queued rounds drain strictly in order.
    let cluster = Cluster::new(1);
    cluster.leader().ingest_proof(proof("task-L", "v1"));
    cluster.leader().ingest_proof(proof("task-L", "v2"));
    cluster.leader().ingest_proof(proof("task-M", "v1"));
    cluster.leader().ingest_proof(proof("task-M", "v2"));

    assert_eq!(cluster.leader().task_state("task-L"), Some(TaskState::Finalized));
    assert_eq!(cluster.leader().task_state("task-M"), Some(TaskState::Finalized));
    assert_eq!(cluster.leader().completed_sequences(), vec![1, 2]);
    assert!(!cluster.leader().processing_consensus());
}

#[test]
fn gc_expires_stale_pending_tasks() {
    let cluster = Cluster::new(4);
    cluster.nodes[1].ingest_proof(proof("task-N", "v1"));
    assert_eq!(cluster.nodes[1].task_state("task-N"), Some(TaskState::Validating));

    // Validating tasks are not expired; only Pending ones are, and only
    // after 24 idle hours.
    let future = now_millis() + 25 * 60 * 60 * 1000;
    cluster.nodes[1].gc_sweep_at(future);
    assert_eq!(cluster.nodes[1].task_state("task-N"), Some(TaskState::Validating));
}
