//! Unit tests for zab-leader.
//!
//! The processor is exercised through its public handle with an in-memory
//! peer handler that records acknowledgment state and queued messages.
//! `shutdown` enqueues the sentinel behind every prior event, so joining
//! the worker makes all previously enqueued events visible to asserts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use zab_types::{ServerId, Zxid};

use crate::processor::quorum_commit_point;
use crate::{
    AckProcessor, AckProcessorHandle, ClusterConfiguration, Message, MessageTuple, PeerHandler,
    ProcessorConfig, ProcessorError, QuorumRegistry,
};

// ============================================================================
// Test Peer
// ============================================================================

struct TestPeer {
    server_id: ServerId,
    last_acked: Mutex<Option<Zxid>>,
    queued: Mutex<Vec<Message>>,
}

impl TestPeer {
    fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            server_id: ServerId::from(id),
            last_acked: Mutex::new(None),
            queued: Mutex::new(Vec::new()),
        })
    }

    /// Zxids of the COMMIT messages queued to this peer, in order.
    fn commits(&self) -> Vec<Zxid> {
        self.queued
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                Message::Commit { zxid } => Some(*zxid),
                _ => None,
            })
            .collect()
    }
}

impl PeerHandler for TestPeer {
    fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    fn last_acked_zxid(&self) -> Option<Zxid> {
        *self.last_acked.lock().unwrap()
    }

    fn set_last_acked_zxid(&self, zxid: Zxid) {
        *self.last_acked.lock().unwrap() = Some(zxid);
    }

    fn queue_message(&self, msg: Message) {
        self.queued.lock().unwrap().push(msg);
    }
}

// ============================================================================
// Harness
// ============================================================================

fn registry_of(peers: &[&Arc<TestPeer>]) -> QuorumRegistry {
    let map: HashMap<ServerId, Arc<dyn PeerHandler>> = peers
        .iter()
        .map(|p| (p.server_id.clone(), Arc::clone(*p) as Arc<dyn PeerHandler>))
        .collect();
    Arc::new(RwLock::new(map))
}

fn config_of(ids: &[&str]) -> ClusterConfiguration {
    ClusterConfiguration::new(ids.iter().map(|s| ServerId::from(*s)), Zxid::NOT_EXIST)
}

fn spawn(
    registry: &QuorumRegistry,
    cluster: ClusterConfiguration,
    last_committed: Zxid,
) -> AckProcessorHandle {
    AckProcessor::spawn(
        Arc::clone(registry),
        cluster,
        last_committed,
        ProcessorConfig::default(),
    )
}

fn ack(handle: &AckProcessorHandle, id: &str, epoch: i64, xid: i64) {
    handle
        .process_request(MessageTuple::new(
            ServerId::from(id),
            Message::Ack {
                zxid: Zxid::new(epoch, xid),
            },
        ))
        .unwrap();
}

// ============================================================================
// Commit Point Function
// ============================================================================

#[test]
fn commit_point_needs_a_quorum() {
    let fallback = Zxid::new(0, 3);
    assert_eq!(quorum_commit_point(vec![], 2, fallback), fallback);
    assert_eq!(
        quorum_commit_point(vec![Zxid::new(1, 9)], 2, fallback),
        fallback
    );
}

#[test]
fn commit_point_is_quorum_th_largest() {
    let acked = vec![
        Zxid::new(1, 10),
        Zxid::new(1, 8),
        Zxid::new(1, 12),
        Zxid::new(1, 7),
        Zxid::new(1, 10),
    ];
    assert_eq!(
        quorum_commit_point(acked.clone(), 3, Zxid::NOT_EXIST),
        Zxid::new(1, 10)
    );
    // A larger quorum picks a smaller commit point.
    assert_eq!(
        quorum_commit_point(acked.clone(), 5, Zxid::NOT_EXIST),
        Zxid::new(1, 7)
    );
    assert_eq!(
        quorum_commit_point(acked, 1, Zxid::NOT_EXIST),
        Zxid::new(1, 12)
    );
}

#[test]
fn commit_point_spans_epochs() {
    let acked = vec![Zxid::new(2, 0), Zxid::new(1, 50), Zxid::new(2, 3)];
    assert_eq!(
        quorum_commit_point(acked, 2, Zxid::NOT_EXIST),
        Zxid::new(2, 0)
    );
}

// ============================================================================
// Ack / Commit Scenarios
// ============================================================================

#[test]
fn quorum_of_five_commits_third_largest() {
    let peers: Vec<_> = ["p1", "p2", "p3", "p4", "p5"]
        .iter()
        .map(|id| TestPeer::new(id))
        .collect();
    let registry = registry_of(&peers.iter().collect::<Vec<_>>());
    let handle = spawn(
        &registry,
        config_of(&["p1", "p2", "p3", "p4", "p5"]),
        Zxid::NOT_EXIST,
    );

    ack(&handle, "p1", 1, 10);
    ack(&handle, "p2", 1, 8);
    ack(&handle, "p3", 1, 12);
    ack(&handle, "p4", 1, 7);
    ack(&handle, "p5", 1, 10);
    // Re-acking at the same value must not re-broadcast.
    ack(&handle, "p4", 1, 10);
    handle.shutdown().unwrap();

    for peer in &peers {
        let commits = peer.commits();
        // The commit point reached (1, 10) and was broadcast exactly once.
        assert_eq!(
            commits.iter().filter(|z| **z == Zxid::new(1, 10)).count(),
            1
        );
        assert_eq!(commits.last(), Some(&Zxid::new(1, 10)));
        // COMMIT zxids never decrease.
        assert!(commits.windows(2).all(|w| w[0] <= w[1]));
    }
}

#[test]
fn no_commit_below_quorum() {
    let p1 = TestPeer::new("p1");
    let p2 = TestPeer::new("p2");
    let p3 = TestPeer::new("p3");
    let p4 = TestPeer::new("p4");
    let p5 = TestPeer::new("p5");
    let registry = registry_of(&[&p1, &p2, &p3, &p4, &p5]);
    let handle = spawn(
        &registry,
        config_of(&["p1", "p2", "p3", "p4", "p5"]),
        Zxid::NOT_EXIST,
    );

    // Two of five acknowledged: short of the quorum of three.
    ack(&handle, "p1", 1, 4);
    ack(&handle, "p2", 1, 4);
    handle.shutdown().unwrap();

    assert!(p1.commits().is_empty());
    assert!(p5.commits().is_empty());
}

#[test]
fn ack_from_non_member_does_not_count() {
    let p1 = TestPeer::new("p1");
    let p2 = TestPeer::new("p2");
    let p3 = TestPeer::new("p3");
    let outsider = TestPeer::new("p9");
    let registry = registry_of(&[&p1, &p2, &p3, &outsider]);
    // p9 is in the working set but not in the configuration.
    let handle = spawn(&registry, config_of(&["p1", "p2", "p3"]), Zxid::NOT_EXIST);

    ack(&handle, "p9", 1, 5);
    ack(&handle, "p1", 1, 5);
    handle.shutdown().unwrap();

    // One member ack is short of the quorum of two; the outsider's ack
    // must not have filled the gap.
    assert!(p1.commits().is_empty());
}

// ============================================================================
// Reconfiguration Scenarios
// ============================================================================

#[test]
fn join_caps_commit_below_pending_version() {
    let p1 = TestPeer::new("p1");
    let p2 = TestPeer::new("p2");
    let p3 = TestPeer::new("p3");
    let p4 = TestPeer::new("p4");
    let registry = registry_of(&[&p1, &p2, &p3, &p4]);
    let handle = spawn(&registry, config_of(&["p1", "p2", "p3"]), Zxid::new(1, 5));

    // p4 joins; the installing transaction has zxid (1, 7).
    handle
        .process_request(MessageTuple::with_zxid(
            ServerId::from("p4"),
            Message::Join,
            Zxid::new(1, 7),
        ))
        .unwrap();

    // A quorum of the old configuration acknowledges past the
    // reconfiguration point.
    ack(&handle, "p1", 1, 9);
    ack(&handle, "p2", 1, 9);
    // The new configuration (quorum 3 of 4) reaches its version.
    ack(&handle, "p4", 1, 8);
    // And continues committing under the new membership.
    ack(&handle, "p3", 1, 9);
    handle.shutdown().unwrap();

    // Old-quorum progress was capped at (1, 6), one below the membership
    // change; the change itself committed at (1, 8); then (1, 9).
    let expected = vec![Zxid::new(1, 6), Zxid::new(1, 8), Zxid::new(1, 9)];
    assert_eq!(p1.commits(), expected);
    assert_eq!(p2.commits(), expected);
    assert_eq!(p3.commits(), expected);
    // The joining peer was already in the broadcast set for all three.
    assert_eq!(p4.commits(), expected);
}

#[test]
fn join_at_epoch_start_blocks_old_quorum_past_the_boundary() {
    let p1 = TestPeer::new("p1");
    let p2 = TestPeer::new("p2");
    let p3 = TestPeer::new("p3");
    let p4 = TestPeer::new("p4");
    let registry = registry_of(&[&p1, &p2, &p3, &p4]);
    let handle = spawn(&registry, config_of(&["p1", "p2", "p3"]), Zxid::new(1, 5));

    // The membership change is the first transaction of epoch 2.
    handle
        .process_request(MessageTuple::with_zxid(
            ServerId::from("p4"),
            Message::Join,
            Zxid::new(2, 0),
        ))
        .unwrap();

    // A quorum of the old configuration acknowledges into epoch 2. The
    // cap lands at (2, -1): everything of epoch 1 commits, the membership
    // change itself does not.
    ack(&handle, "p1", 2, 3);
    ack(&handle, "p2", 2, 3);
    // Only once the new configuration reaches its version does the commit
    // point cross the boundary.
    ack(&handle, "p4", 2, 1);
    handle.shutdown().unwrap();

    let expected = vec![Zxid::new(2, -1), Zxid::new(2, 1)];
    assert_eq!(p1.commits(), expected);
    assert_eq!(p4.commits(), expected);
    // The reconfiguration zxid was never committed under the old quorum.
    assert!(!p1.commits().contains(&Zxid::new(2, 0)));
}

#[test]
fn remove_commits_under_shrunk_quorum() {
    let p1 = TestPeer::new("p1");
    let p2 = TestPeer::new("p2");
    let p3 = TestPeer::new("p3");
    let registry = registry_of(&[&p1, &p2, &p3]);
    let handle = spawn(&registry, config_of(&["p1", "p2", "p3"]), Zxid::NOT_EXIST);

    // Remove p3; the installing transaction has zxid (1, 4).
    handle
        .process_request(MessageTuple::with_zxid(
            ServerId::from("p1"),
            Message::Remove {
                server_id: ServerId::from("p3"),
            },
            Zxid::new(1, 4),
        ))
        .unwrap();

    ack(&handle, "p1", 1, 5);
    ack(&handle, "p2", 1, 5);
    handle.shutdown().unwrap();

    // Both members of the shrunk configuration acknowledged past the
    // removal, committing it and everything up to (1, 5).
    assert_eq!(p1.commits(), vec![Zxid::new(1, 5)]);
    // p3 is still connected, so it is told about the commit too.
    assert_eq!(p3.commits(), vec![Zxid::new(1, 5)]);
}

#[test]
fn double_reconfig_is_fatal() {
    let p1 = TestPeer::new("p1");
    let p2 = TestPeer::new("p2");
    let p3 = TestPeer::new("p3");
    let p4 = TestPeer::new("p4");
    let p5 = TestPeer::new("p5");
    let registry = registry_of(&[&p1, &p2, &p3, &p4, &p5]);
    let handle = spawn(&registry, config_of(&["p1", "p2", "p3"]), Zxid::NOT_EXIST);

    handle
        .process_request(MessageTuple::with_zxid(
            ServerId::from("p4"),
            Message::Join,
            Zxid::new(1, 7),
        ))
        .unwrap();
    handle
        .process_request(MessageTuple::with_zxid(
            ServerId::from("p5"),
            Message::Join,
            Zxid::new(1, 8),
        ))
        .unwrap();

    let err = handle.shutdown().unwrap_err();
    match err {
        ProcessorError::ConcurrentReconfig {
            server_id,
            pending_version,
        } => {
            assert_eq!(server_id, ServerId::from("p5"));
            assert_eq!(pending_version, Zxid::new(1, 7));
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ============================================================================
// Membership Events
// ============================================================================

#[test]
fn disconnected_peer_stops_counting() {
    let p1 = TestPeer::new("p1");
    let p2 = TestPeer::new("p2");
    let p3 = TestPeer::new("p3");
    let registry = registry_of(&[&p1, &p2, &p3]);
    let handle = spawn(&registry, config_of(&["p1", "p2", "p3"]), Zxid::NOT_EXIST);

    // p2 acknowledged far ahead, then dropped.
    ack(&handle, "p2", 1, 5);
    handle
        .process_request(MessageTuple::new(
            ServerId::from("p2"),
            Message::Disconnected {
                server_id: ServerId::from("p2"),
            },
        ))
        .unwrap();

    // The remaining two form a quorum at (1, 1); p2's stale (1, 5) must
    // not pull the commit point up.
    ack(&handle, "p1", 1, 1);
    ack(&handle, "p3", 1, 1);
    handle.shutdown().unwrap();

    assert_eq!(p1.commits(), vec![Zxid::new(1, 1)]);
    assert_eq!(p3.commits(), vec![Zxid::new(1, 1)]);
    // The disconnected peer no longer receives broadcasts.
    assert!(p2.commits().is_empty());
}

#[test]
fn ack_epoch_lifts_peer_into_working_set() {
    let p1 = TestPeer::new("p1");
    let p2 = TestPeer::new("p2");
    let p3 = TestPeer::new("p3");
    // p3 connects after the processor starts.
    let registry = registry_of(&[&p1, &p2]);
    let handle = spawn(&registry, config_of(&["p1", "p2", "p3"]), Zxid::NOT_EXIST);

    registry.write().unwrap().insert(
        p3.server_id.clone(),
        Arc::clone(&p3) as Arc<dyn PeerHandler>,
    );

    // Before ACK_EPOCH the peer is outside the working set: its acks are
    // dropped.
    ack(&handle, "p3", 1, 2);
    handle
        .process_request(MessageTuple::new(ServerId::from("p3"), Message::AckEpoch))
        .unwrap();
    ack(&handle, "p3", 1, 2);
    ack(&handle, "p1", 1, 2);
    handle.shutdown().unwrap();

    assert_eq!(p1.commits(), vec![Zxid::new(1, 2)]);
    assert_eq!(p3.commits(), vec![Zxid::new(1, 2)]);
}

#[test]
fn unexpected_messages_are_ignored() {
    let p1 = TestPeer::new("p1");
    let p2 = TestPeer::new("p2");
    let p3 = TestPeer::new("p3");
    let registry = registry_of(&[&p1, &p2, &p3]);
    let handle = spawn(&registry, config_of(&["p1", "p2", "p3"]), Zxid::NOT_EXIST);

    handle
        .process_request(MessageTuple::new(ServerId::from("p1"), Message::Heartbeat))
        .unwrap();
    handle
        .process_request(MessageTuple::new(
            ServerId::from("p1"),
            Message::Proposal {
                txn: zab_types::Transaction::new(Zxid::new(1, 1), 0, bytes::Bytes::from("x")),
            },
        ))
        .unwrap();
    ack(&handle, "p1", 1, 1);
    ack(&handle, "p2", 1, 1);
    handle.shutdown().unwrap();

    // The stray envelopes changed nothing; the quorum still committed.
    assert_eq!(p1.commits(), vec![Zxid::new(1, 1)]);
}
