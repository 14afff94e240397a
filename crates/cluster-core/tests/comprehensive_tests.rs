//! # comprehensive protocol tests
//!
//! why: verify every message survives the wire and every reconciliation keeps its invariants
//! relations: tests cluster-core with small in-file collaborators
//! what: round-trip, handshake, discovery, election, quorum and decode-error scenarios

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use cluster_core::{
    AckRound, AckState, ClearMode, ClusterConfig, ConfigUpdate, Connect, ConnectResponse,
    DecodeError, Discovery, Election, EligibilityCause, FileKind, FileVersion, Frame,
    IncomingFile, Message, MessageType, NodeDirectory, NodeId, NodeInfo, Office, Payload,
    ResponseCode, StoreError, VersionStore, VersionVector, Wire, MAX_NODES,
};

// =============================================================================
// TEST COLLABORATORS
// =============================================================================

#[derive(Clone)]
struct TestDirectory {
    local: NodeId,
    nodes: Vec<NodeInfo>,
    master: Option<NodeId>,
    vice: Option<NodeId>,
    local_disks: u32,
}

impl TestDirectory {
    /// local node 101, nodes 101..=101+n-1 all alive with 2 disks
    fn with_nodes(count: u32) -> Self {
        Self {
            local: NodeId(101),
            nodes: (0..count)
                .map(|i| NodeInfo {
                    id: NodeId(101 + i),
                    alive: true,
                    disks: 2,
                })
                .collect(),
            master: None,
            vice: None,
            local_disks: 4,
        }
    }

    fn kill(&mut self, id: u32) {
        for info in &mut self.nodes {
            if info.id == NodeId(id) {
                info.alive = false;
            }
        }
    }
}

impl NodeDirectory for TestDirectory {
    fn local_node(&self) -> NodeId {
        self.local
    }
    fn nodes(&self) -> Vec<NodeInfo> {
        self.nodes.clone()
    }
    fn master(&self) -> Option<NodeId> {
        self.master
    }
    fn vice_master(&self) -> Option<NodeId> {
        self.vice
    }
    fn local_disks(&self) -> u32 {
        self.local_disks
    }
}

/// store whose stage outcome is fixed up front
struct TestStore {
    versions: Vec<Option<FileVersion>>,
    accept: bool,
    staged: Vec<IncomingFile>,
}

impl TestStore {
    fn new(versions: Vec<Option<FileVersion>>) -> Self {
        Self {
            versions,
            accept: true,
            staged: Vec::new(),
        }
    }
}

impl VersionStore for TestStore {
    fn tracked_kinds(&self) -> Vec<FileKind> {
        (0..self.versions.len() as u8).map(FileKind).collect()
    }
    fn current_version(&self, kind: FileKind) -> Option<FileVersion> {
        self.versions.get(kind.0 as usize).copied().flatten()
    }
    fn file_bytes(&self, _kind: FileKind) -> Option<Bytes> {
        None
    }
    fn checksum(&self, _kind: FileKind) -> Option<[u8; 16]> {
        None
    }
    fn stage(&mut self, incoming: &IncomingFile) -> Result<(), StoreError> {
        if !self.accept {
            return Err(StoreError::Unavailable {
                kind: incoming.kind,
                version: incoming.version,
            });
        }
        self.staged.push(incoming.clone());
        Ok(())
    }
    fn commit(&mut self, kind: FileKind) -> Result<FileVersion, StoreError> {
        Err(StoreError::NothingStaged(kind))
    }
}

fn config() -> ClusterConfig {
    ClusterConfig::default()
}

fn round_trip(frame: &Frame) -> Frame {
    Frame::from_bytes(&frame.to_bytes(), &config()).unwrap()
}

fn connect(version: &str, slots: Vec<Option<FileVersion>>) -> Connect {
    Connect::new(version, VersionVector::new(slots)).0
}

// =============================================================================
// SECTION 1: WIRE ROUND-TRIP TESTS
// =============================================================================

mod round_trips {
    use super::*;

    #[test]
    fn connect_frame_keeps_version_vector_and_timeout() {
        let store = TestStore::new(vec![Some(FileVersion::new(3)), None, Some(FileVersion::wiped(7))]);
        let (frame, truncated) = Frame::connect(&config(), &store);
        assert!(!truncated);

        let decoded = round_trip(&frame);
        assert_eq!(decoded, frame);
        assert_eq!(decoded.timeout(), Some(config().connect_timeout()));
        match decoded.payload() {
            Payload::Message(Message::Connect(connect)) => {
                let slots = connect.versions().slots();
                assert_eq!(slots.len(), 3);
                assert!(slots[1].is_none());
                assert_eq!(slots[2].map(|v| (v.version, v.wiped)), Some((7, true)));
            }
            other => panic!("expected Connect, got {:?}", other),
        }
    }

    #[test]
    fn connect_response_keeps_code_and_both_connects() {
        let local = connect("4.0", vec![Some(FileVersion::new(3))]);
        let peer = connect("4.1", vec![Some(FileVersion::new(2))]);
        let frame = Frame::connect_response(local.respond_to(&peer));

        match round_trip(&frame).into_payload() {
            Payload::Message(Message::ConnectResponse(response)) => {
                assert_eq!(response.code().bits(), 3);
                assert_eq!(response.local().software_version(), "4.0");
                assert_eq!(response.peer().software_version(), "4.1");
                assert_eq!(response.peer().versions().get(0), Some(FileVersion::new(2)));
            }
            other => panic!("expected ConnectResponse, got {:?}", other),
        }
    }

    #[test]
    fn discovery_keeps_absent_officeholders() {
        let mut directory = TestDirectory::with_nodes(4);
        directory.kill(103);
        let snapshot = Discovery::from_directory(&directory, &config());
        let frame = Frame::discovery(snapshot.clone(), &config());

        let decoded = round_trip(&frame);
        assert!(decoded.is_broadcast());
        assert!(decoded.is_armed());
        match decoded.payload() {
            Payload::Message(Message::Discovery(decoded)) => {
                assert_eq!(decoded, &snapshot);
                assert_eq!(decoded.master(), None);
                assert_eq!(decoded.vice_master(), None);
            }
            other => panic!("expected Discovery, got {:?}", other),
        }
    }

    #[test]
    fn discovery_keeps_officeholders_and_disk_counts() {
        let mut directory = TestDirectory::with_nodes(3);
        directory.master = Some(NodeId(102));
        directory.vice = Some(NodeId(101));
        let snapshot = Discovery::from_directory(&directory, &config());

        let decoded = round_trip(&Frame::discovery(snapshot.clone(), &config()));
        assert_eq!(decoded.as_message(), Some(&Message::Discovery(snapshot)));
    }

    #[test]
    fn withdrawn_candidacy_keeps_absent_candidate() {
        let mut election = Election::candidacy(NodeId(104), Office::ViceMaster);
        assert!(election.remove_candidate());
        election.set_cancel(true);
        let frame = Frame::message(Message::Election(election)).with_broadcast();

        match round_trip(&frame).into_payload() {
            Payload::Message(Message::Election(election)) => {
                assert_eq!(election.candidate(), None);
                assert!(election.is_request());
                assert!(election.is_canceled());
                assert_eq!(election.office(), Office::ViceMaster);
            }
            other => panic!("expected Election, got {:?}", other),
        }
    }

    #[test]
    fn eligibility_round_trips() {
        let frame = Frame::eligibility(EligibilityCause::Ineligible, &config());
        assert_eq!(round_trip(&frame), frame);
    }

    #[test]
    fn ack_round_keeps_tri_state_slots() {
        let mut round = AckRound::initiate(&config(), NodeId(101), 42).unwrap();
        round.ack(NodeId(102)).unwrap();
        round.nack(NodeId(103)).unwrap();
        let frame = Frame::accumulator(cluster_core::Accumulator::Round(round.clone()))
            .with_request_id(9);

        let decoded = round_trip(&frame);
        assert_eq!(decoded.request_id(), Some(9));
        assert_eq!(decoded.message_type(), MessageType::AckRound);
        let decoded = decoded.as_accumulator().unwrap().round();
        assert_eq!(decoded, &round);
        assert_eq!(decoded.state(NodeId(104)).unwrap(), AckState::Unvisited);
    }

    #[test]
    fn config_update_keeps_payload_and_absent_content() {
        let small = ClusterConfig {
            max_frame_payload: 4,
            ..config()
        };
        let update = ConfigUpdate::initiate(
            &small,
            NodeId(101),
            FileKind(2),
            11,
            ClearMode::Wipe,
            [7; 16],
            Bytes::from_static(b"too big"),
        )
        .unwrap();
        let frame = Frame::config_update(update.clone(), 77, &small);

        let decoded = Frame::from_bytes(&frame.to_bytes(), &small).unwrap();
        assert_eq!(decoded, frame);
        match decoded.into_payload() {
            Payload::Accumulator(cluster_core::Accumulator::Update(decoded)) => {
                assert_eq!(decoded.content(), None);
                assert_eq!(decoded.kind(), FileKind(2));
                assert_eq!(decoded.clear_mode(), ClearMode::Wipe);
                assert_eq!(decoded.checksum(), &[7; 16]);
                assert_eq!(decoded.version(), 11);
            }
            other => panic!("expected ConfigUpdate, got {:?}", other),
        }
    }
}

// =============================================================================
// SECTION 2: HANDSHAKE TESTS
// =============================================================================

mod handshake {
    use super::*;

    #[test]
    fn matching_peers_get_ok() {
        let local = connect("4.0", vec![Some(FileVersion::new(3))]);
        let peer = connect("4.0", vec![Some(FileVersion::new(3))]);
        assert_eq!(local.respond_to(&peer).code(), ResponseCode::OK);
    }

    #[test]
    fn software_skew_sets_only_sw_bit() {
        let local = connect("4.0", vec![Some(FileVersion::new(3))]);
        let peer = connect("4.1", vec![Some(FileVersion::new(3))]);
        let code = local.respond_to(&peer).code();
        assert!(code.contains(ResponseCode::SW_MISMATCH));
        assert!(!code.contains(ResponseCode::CFG_MISMATCH));
    }

    #[test]
    fn wiped_flag_difference_is_a_config_mismatch() {
        let local = connect("4.0", vec![Some(FileVersion::new(3)), Some(FileVersion::new(5))]);
        let peer = connect("4.0", vec![Some(FileVersion::new(3)), Some(FileVersion::wiped(5))]);
        let code = local.respond_to(&peer).code();
        assert!(code.contains(ResponseCode::CFG_MISMATCH));
        assert!(!code.contains(ResponseCode::SW_MISMATCH));
    }

    #[test]
    fn both_wiped_is_not_a_mismatch() {
        let local = connect("4.0", vec![Some(FileVersion::wiped(5))]);
        let peer = connect("4.0", vec![Some(FileVersion::wiped(9))]);
        assert_eq!(local.respond_to(&peer).code(), ResponseCode::OK);
    }

    #[test]
    fn version_counter_difference_is_a_mismatch() {
        let local = connect("4.0", vec![Some(FileVersion::new(3))]);
        let peer = connect("4.0", vec![Some(FileVersion::new(4))]);
        assert_eq!(local.respond_to(&peer).code(), ResponseCode::CFG_MISMATCH);
    }

    #[test]
    fn one_sided_absence_is_a_mismatch() {
        let local = connect("4.0", vec![Some(FileVersion::new(3))]);
        let peer = connect("4.0", vec![None]);
        assert_eq!(local.respond_to(&peer).code(), ResponseCode::CFG_MISMATCH);
    }

    #[test]
    fn extra_slots_on_longer_vector_are_not_compared() {
        let local = connect("4.0", vec![Some(FileVersion::new(3))]);
        let peer = connect("4.0", vec![Some(FileVersion::new(3)), Some(FileVersion::new(8))]);
        assert_eq!(local.respond_to(&peer).code(), ResponseCode::OK);
    }

    #[test]
    fn response_built_from_store_embeds_local_vector() {
        let cfg = ClusterConfig {
            software_version: "4.0".into(),
            ..config()
        };
        let store = TestStore::new(vec![Some(FileVersion::new(3))]);
        let peer = connect("4.0", vec![Some(FileVersion::new(3))]);

        let response = ConnectResponse::build(&cfg, &store, peer.clone());
        assert_eq!(response.code(), ResponseCode::OK);
        assert_eq!(response.local().versions(), &store.version_vector());
        assert_eq!(response.peer(), &peer);
    }

    #[test]
    fn oversized_software_version_is_signalled() {
        let cfg = ClusterConfig {
            software_version: "x".repeat(300),
            ..config()
        };
        let (frame, truncated) = Frame::connect(&cfg, &TestStore::new(vec![]));
        assert!(truncated);
        match frame.payload() {
            Payload::Message(Message::Connect(connect)) => {
                assert_eq!(connect.software_version().len(), 127)
            }
            other => panic!("expected Connect, got {:?}", other),
        }
    }
}

// =============================================================================
// SECTION 3: DISCOVERY RECONCILIATION TESTS
// =============================================================================

mod discovery {
    use super::*;

    #[test]
    fn full_update_partitions_every_node() {
        let mut directory = TestDirectory::with_nodes(5);
        directory.kill(102);
        directory.kill(105);

        let snapshot = Discovery::from_directory(&directory, &config());
        let alive: Vec<u32> = snapshot.alive_nodes().map(NodeId::get).collect();
        let dead: Vec<u32> = snapshot.dead_nodes().map(NodeId::get).collect();
        assert_eq!(alive, vec![101, 103, 104]);
        assert_eq!(dead, vec![102, 105]);
    }

    #[test]
    fn full_update_revives_previously_dead_node() {
        let mut directory = TestDirectory::with_nodes(3);
        directory.kill(103);
        let mut snapshot = Discovery::from_directory(&directory, &config());
        assert!(snapshot.is_dead(NodeId(103)));

        directory.nodes[2].alive = true;
        snapshot.update_all_nodes_status(&directory, &config());
        assert!(snapshot.is_alive(NodeId(103)));
        assert!(!snapshot.is_dead(NodeId(103)));
    }

    #[test]
    fn local_update_moves_self_to_alive_and_claims_office() {
        let mut directory = TestDirectory::with_nodes(3);
        directory.kill(101);
        let mut snapshot = Discovery::from_directory(&directory, &config());
        assert!(snapshot.is_dead(NodeId(101)));

        directory.master = Some(NodeId(101));
        snapshot.update_local_node_status(&directory, &config());
        assert!(snapshot.is_alive(NodeId(101)));
        assert!(!snapshot.is_dead(NodeId(101)));
        assert_eq!(snapshot.master(), Some(NodeId(101)));
    }

    #[test]
    fn local_update_is_idempotent() {
        let mut directory = TestDirectory::with_nodes(3);
        directory.vice = Some(NodeId(101));
        let mut snapshot = Discovery::from_directory(&directory, &config());
        snapshot.update_local_node_status(&directory, &config());
        let once = snapshot.clone();
        snapshot.update_local_node_status(&directory, &config());
        assert_eq!(snapshot, once);
    }

    #[test]
    fn local_update_releases_lost_office() {
        let mut directory = TestDirectory::with_nodes(3);
        directory.master = Some(NodeId(101));
        let mut snapshot = Discovery::from_directory(&directory, &config());

        directory.master = Some(NodeId(102));
        snapshot.update_local_node_status(&directory, &config());
        assert_eq!(snapshot.master(), None);
    }

    #[test]
    fn remote_connect_demotes_nodes_ranked_before_it() {
        let mut directory = TestDirectory::with_nodes(5);
        directory.master = Some(NodeId(102));
        let mut snapshot = Discovery::from_directory(&directory, &config());

        let demoted = snapshot.update_nodes_info(&directory, NodeId(104));
        // local 101 is never demoted
        assert_eq!(demoted, vec![NodeId(102), NodeId(103)]);
        assert!(snapshot.is_dead(NodeId(102)));
        assert!(snapshot.is_alive(NodeId(104)));
        assert!(snapshot.is_alive(NodeId(105)));
        assert_eq!(snapshot.master(), None);
    }

    #[test]
    fn local_connect_demotes_everyone_else() {
        let directory = TestDirectory::with_nodes(4);
        let mut snapshot = Discovery::from_directory(&directory, &config());

        let demoted = snapshot.update_nodes_info(&directory, NodeId(101));
        assert_eq!(demoted.len(), 3);
        let alive: Vec<NodeId> = snapshot.alive_nodes().collect();
        assert_eq!(alive, vec![NodeId(101)]);
    }

    #[test]
    fn snapshot_with_foreign_directory_entry_still_decodes() {
        let mut directory = TestDirectory::with_nodes(1);
        directory.nodes.push(NodeInfo {
            id: NodeId(140),
            alive: true,
            disks: 2,
        });
        directory.master = Some(NodeId(140));
        let narrow = ClusterConfig {
            max_nodes: 4,
            ..config()
        };

        let frame = Frame::discovery(Discovery::from_directory(&directory, &narrow), &narrow);
        let received = Frame::from_bytes(&frame.to_bytes(), &narrow).unwrap();
        let Some(Message::Discovery(snapshot)) = received.as_message() else {
            panic!("expected Discovery");
        };
        let alive: Vec<NodeId> = snapshot.alive_nodes().collect();
        assert_eq!(alive, vec![NodeId(101)]);
        assert_eq!(snapshot.master(), None);
    }

    #[test]
    fn disk_count_is_live_for_local_only() {
        let mut directory = TestDirectory::with_nodes(2);
        let snapshot = Discovery::from_directory(&directory, &config());
        directory.local_disks = 12;
        directory.nodes[1].disks = 30;

        assert_eq!(snapshot.disks_count(NodeId(101), &directory), Some(12));
        assert_eq!(snapshot.disks_count(NodeId(102), &directory), Some(2));
    }
}

// =============================================================================
// SECTION 4: ELECTION AND ELIGIBILITY TESTS
// =============================================================================

mod election {
    use super::*;

    #[test]
    fn candidacy_is_broadcast_armed_request() {
        let frame = Frame::candidacy(NodeId(103), Office::Master, &config());
        assert!(frame.is_broadcast());
        assert_eq!(frame.timeout(), Some(config().election_timeout()));
        match frame.payload() {
            Payload::Message(Message::Election(election)) => {
                assert!(election.is_request());
                assert!(!election.is_canceled());
                assert_eq!(election.candidate(), Some(NodeId(103)));
            }
            other => panic!("expected Election, got {:?}", other),
        }
    }

    #[test]
    fn notification_is_broadcast_armed_outcome() {
        let frame = Frame::election_notification(NodeId(102), Office::ViceMaster, &config());
        assert!(frame.is_broadcast());
        assert!(frame.is_armed());
        match round_trip(&frame).payload() {
            Payload::Message(Message::Election(election)) => {
                assert!(!election.is_request());
                assert_eq!(election.office(), Office::ViceMaster);
                assert_eq!(election.candidate(), Some(NodeId(102)));
            }
            other => panic!("expected Election, got {:?}", other),
        }
    }

    #[test]
    fn cancel_flag_can_be_cleared_again() {
        let mut election = Election::candidacy(NodeId(101), Office::Master);
        election.set_cancel(true);
        assert!(election.is_canceled());
        election.set_cancel(false);
        assert!(!election.is_canceled());
    }

    #[test]
    fn arming_overrides_previous_timeout() {
        let mut frame = Frame::eligibility(EligibilityCause::Eligible, &config());
        frame.arm(Duration::from_millis(250));
        assert_eq!(round_trip(&frame).timeout(), Some(Duration::from_millis(250)));
    }
}

// =============================================================================
// SECTION 5: QUORUM UPDATE TESTS
// =============================================================================

mod quorum {
    use super::*;

    #[test]
    fn round_on_unvalidated_range_near_id_ceiling_stays_in_bounds() {
        let cfg = ClusterConfig {
            base_node_id: u32::MAX - 2,
            ..config()
        };
        assert!(cfg.validate().is_err());

        let round = AckRound::initiate(&cfg, NodeId(u32::MAX - 2), 1).unwrap();
        assert_eq!(
            round.unvisited_nodes(),
            vec![NodeId(u32::MAX - 1), NodeId(u32::MAX)]
        );
    }

    fn four_node_config() -> ClusterConfig {
        ClusterConfig {
            max_nodes: 4,
            ..config()
        }
    }

    #[test]
    fn acked_and_unvisited_is_valid() {
        let mut round = AckRound::initiate(&four_node_config(), NodeId(101), 1).unwrap();
        round.ack(NodeId(102)).unwrap();
        assert!(round.is_valid());
        assert_eq!(round.ack_count(), 2);
    }

    #[test]
    fn any_nack_invalidates() {
        let mut round = AckRound::initiate(&four_node_config(), NodeId(101), 1).unwrap();
        round.nack(NodeId(102)).unwrap();
        assert!(!round.is_valid());
        assert_eq!(round.nacked_nodes(), vec![NodeId(102)]);
    }

    #[test]
    fn all_unvisited_is_valid() {
        // even the master slot is untouched; such a round only arrives off the wire
        let mut out = BytesMut::new();
        out.put_u64(1);
        out.put_i32(101);
        for _ in 0..MAX_NODES {
            out.put_i32(-1);
        }
        let mut buf = out.freeze();
        let round = AckRound::decode(&mut buf, &config()).unwrap();
        assert!(round.is_valid());
        assert_eq!(round.unvisited_nodes().len(), 16);
    }

    #[test]
    fn content_at_half_mtu_is_inlined() {
        let cfg = ClusterConfig {
            max_frame_payload: 100,
            ..config()
        };
        let exact = ConfigUpdate::initiate(
            &cfg,
            NodeId(101),
            FileKind(0),
            1,
            ClearMode::Replace,
            [0; 16],
            Bytes::from(vec![1u8; 50]),
        )
        .unwrap();
        assert!(exact.is_inline());
        assert_eq!(exact.content().map(|c| c.len()), Some(50));

        let over = ConfigUpdate::initiate(
            &cfg,
            NodeId(101),
            FileKind(0),
            1,
            ClearMode::Replace,
            [0; 16],
            Bytes::from(vec![1u8; 51]),
        )
        .unwrap();
        assert!(!over.is_inline());
    }

    #[test]
    fn abandoned_round_when_one_dispatched_node_nacks() {
        let cfg = config();
        let update = ConfigUpdate::initiate(
            &cfg,
            NodeId(101),
            FileKind(1),
            8,
            ClearMode::Replace,
            [3; 16],
            Bytes::from_static(b"topology"),
        )
        .unwrap();
        let mut frame = Frame::config_update(update, 1, &cfg);

        // the frame hops 102 -> 103 -> 104 -> 105, each hop decoding and re-encoding it
        for node in 102..=105 {
            let mut hop = Frame::from_bytes(&frame.to_bytes(), &cfg).unwrap();
            let round = hop.accumulator_mut().unwrap().round_mut();
            if node == 104 {
                round.nack(NodeId(node)).unwrap();
            } else {
                round.ack(NodeId(node)).unwrap();
            }
            frame = hop;
        }

        let accumulator = frame.as_accumulator().unwrap();
        assert!(!accumulator.is_valid());
        assert_eq!(accumulator.round().nacked_nodes(), vec![NodeId(104)]);
        assert_eq!(accumulator.round().ack_count(), 4);
    }

    #[test]
    fn visit_acks_when_store_accepts() {
        let mut update = ConfigUpdate::initiate(
            &config(),
            NodeId(101),
            FileKind(0),
            2,
            ClearMode::Replace,
            [1; 16],
            Bytes::from_static(b"cfg"),
        )
        .unwrap();
        let mut store = TestStore::new(vec![None]);

        let state = update.visit(NodeId(103), &mut store).unwrap();
        assert_eq!(state, AckState::Acked);
        assert_eq!(store.staged.len(), 1);
        assert_eq!(store.staged[0].version, 2);
        assert!(update.is_valid());
    }

    #[test]
    fn visit_nacks_when_store_refuses() {
        let mut update = ConfigUpdate::initiate(
            &config(),
            NodeId(101),
            FileKind(0),
            2,
            ClearMode::Replace,
            [1; 16],
            Bytes::from_static(b"cfg"),
        )
        .unwrap();
        let mut store = TestStore::new(vec![None]);
        store.accept = false;

        let state = update.visit(NodeId(103), &mut store).unwrap();
        assert_eq!(state, AckState::Nacked);
        assert!(!update.is_valid());
    }

    #[test]
    fn visit_from_outside_range_fails() {
        let mut update = ConfigUpdate::initiate(
            &four_node_config(),
            NodeId(101),
            FileKind(0),
            2,
            ClearMode::Replace,
            [1; 16],
            Bytes::new(),
        )
        .unwrap();
        let mut store = TestStore::new(vec![None]);
        assert!(update.visit(NodeId(120), &mut store).is_err());
    }
}

// =============================================================================
// SECTION 6: DECODE ERROR TESTS
// =============================================================================

mod decode_errors {
    use super::*;

    #[test]
    fn empty_buffer_is_truncated() {
        assert!(matches!(
            Frame::from_bytes(&[], &config()),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!(
            Frame::from_bytes(&[42, 0], &config()),
            Err(DecodeError::UnknownTypeTag(42))
        );
    }

    #[test]
    fn node_outside_receiver_range_is_rejected() {
        let mut directory = TestDirectory::with_nodes(6);
        directory.master = Some(NodeId(106));
        let snapshot = Discovery::from_directory(&directory, &config());
        let frame = Frame::discovery(snapshot, &config());

        let narrow = ClusterConfig {
            max_nodes: 4,
            ..config()
        };
        assert_eq!(
            Frame::from_bytes(&frame.to_bytes(), &narrow),
            Err(DecodeError::UnknownNode(106))
        );
    }

    #[test]
    fn response_code_with_undefined_bits_is_rejected() {
        let local = connect("4.0", vec![]);
        let response = local.respond_to(&connect("4.0", vec![]));
        let body_len = response.to_bytes().len();
        let mut bytes = Frame::connect_response(response).to_bytes().to_vec();
        let code_at = bytes.len() - body_len;
        bytes[code_at..code_at + 4].copy_from_slice(&0xF0u32.to_be_bytes());

        assert_eq!(
            Frame::from_bytes(&bytes, &config()),
            Err(DecodeError::InvalidCode {
                field: "response code",
                code: 0xF0,
            })
        );
    }

    #[test]
    fn cut_frame_is_truncated() {
        let frame = Frame::candidacy(NodeId(102), Office::Master, &config());
        let bytes = frame.to_bytes();
        assert!(matches!(
            Frame::from_bytes(&bytes[..bytes.len() - 2], &config()),
            Err(DecodeError::Truncated { .. })
        ));
    }
}

// =============================================================================
// SECTION 7: PROPERTY TESTS
// =============================================================================

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn full_update_partitions_and_keeps_officeholders_alive(
            liveness in prop::collection::vec(any::<bool>(), 1..=16),
            master in prop::option::of(0usize..16),
            vice in prop::option::of(0usize..16),
        ) {
            let mut directory = TestDirectory::with_nodes(liveness.len() as u32);
            for (info, alive) in directory.nodes.iter_mut().zip(&liveness) {
                info.alive = *alive;
            }
            directory.master = master.map(|i| NodeId(101 + i as u32));
            directory.vice = vice.map(|i| NodeId(101 + i as u32));

            let snapshot = Discovery::from_directory(&directory, &config());
            for info in &directory.nodes {
                prop_assert!(snapshot.is_alive(info.id) != snapshot.is_dead(info.id));
            }
            for holder in [snapshot.master(), snapshot.vice_master()].into_iter().flatten() {
                prop_assert!(snapshot.is_alive(holder));
            }

            // a local refresh keeps the same invariants
            let mut refreshed = snapshot.clone();
            refreshed.update_local_node_status(&directory, &config());
            prop_assert!(refreshed.is_alive(directory.local));
            for info in &directory.nodes {
                prop_assert!(!(refreshed.is_alive(info.id) && refreshed.is_dead(info.id)));
            }
            for holder in [refreshed.master(), refreshed.vice_master()].into_iter().flatten() {
                prop_assert!(refreshed.is_alive(holder));
            }

            // demotion keeps the same invariants
            let mut demoted = snapshot.clone();
            demoted.update_nodes_info(&directory, NodeId(101 + liveness.len() as u32 / 2));
            for info in &directory.nodes {
                prop_assert!(!(demoted.is_alive(info.id) && demoted.is_dead(info.id)));
            }
            for holder in [demoted.master(), demoted.vice_master()].into_iter().flatten() {
                prop_assert!(demoted.is_alive(holder));
            }
        }

        #[test]
        fn round_is_valid_iff_nobody_nacked(states in prop::collection::vec(0u8..3, 15)) {
            let mut round = AckRound::initiate(&config(), NodeId(101), 3).unwrap();
            for (offset, state) in states.iter().enumerate() {
                let node = NodeId(102 + offset as u32);
                match state {
                    0 => round.nack(node).unwrap(),
                    1 => round.ack(node).unwrap(),
                    _ => {}
                }
            }
            prop_assert_eq!(round.is_valid(), !states.contains(&0));
        }
    }
}
