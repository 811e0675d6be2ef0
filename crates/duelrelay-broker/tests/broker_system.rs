//! Integration tests for matchmaking, relay, and teardown.
//!
//! Clients are simulated by `mpsc` receivers standing in for their
//! connection writer tasks.

use std::time::{Duration, Instant};

use duelrelay_broker::{
    Broker, BrokerConfig, BrokerError, ClientPhase, Departure, Matched, RelayOutcome,
    RelayPolicy, RelayScope, TeardownPolicy, spawn_broker, spawn_broker_with,
};
use duelrelay_protocol::{
    ClientIdentity, EventKind, GameEvent, Identify, Notice, RelayEvent, RoomId,
    ServerMessage, StatusMessage,
};
use duelrelay_transport::ConnectionId;
use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver};

// =========================================================================
// Helpers
// =========================================================================

type Inbox = UnboundedReceiver<ServerMessage>;

fn cid(n: u64) -> ConnectionId {
    ConnectionId::new(n)
}

fn id(raw: &str) -> ClientIdentity {
    ClientIdentity::from(raw)
}

/// Identifies `device` on connection `conn` and returns its inbox.
fn join(broker: &mut Broker, conn: u64, device: &str) -> (Result<Matched, BrokerError>, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    let result = broker.identify(cid(conn), Identify::new(device), tx);
    (result, rx)
}

fn drain(inbox: &mut Inbox) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = inbox.try_recv() {
        out.push(msg);
    }
    out
}

fn position(sender: &str, x: i64, y: i64) -> RelayEvent {
    RelayEvent {
        sender: id(sender),
        event: GameEvent::PositionUpdate {
            new_position: json!({"x": x, "y": y}),
        },
    }
}

fn score(sender: &str) -> RelayEvent {
    RelayEvent {
        sender: id(sender),
        event: GameEvent::ScoreAndStrength {
            score: json!(10),
            strength: json!(4),
            is_game_over: json!(false),
            opponent_id: json!("p2"),
            remote_strength: None,
        },
    }
}

fn connected_room(msg: &ServerMessage) -> (RoomId, ClientIdentity, ClientIdentity) {
    match msg {
        ServerMessage::Status(StatusMessage::Connected {
            room_id,
            device_id,
            opponent_device_id,
            ..
        }) => (room_id.clone(), device_id.clone(), opponent_device_id.clone()),
        other => panic!("expected connected, got {other:?}"),
    }
}

/// Pairs p1 (conn 1) and p2 (conn 2) and clears both inboxes.
fn paired(broker: &mut Broker) -> (RoomId, Inbox, Inbox) {
    let (_, mut p1) = join(broker, 1, "p1");
    let (result, mut p2) = join(broker, 2, "p2");
    let Ok(Matched::Paired { room_id, .. }) = result else {
        panic!("expected pairing, got {result:?}");
    };
    drain(&mut p1);
    drain(&mut p2);
    (room_id, p1, p2)
}

// =========================================================================
// Identify / pairing
// =========================================================================

#[test]
fn test_first_identify_waits_and_acknowledges() {
    let mut broker = Broker::new(BrokerConfig::default());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = broker.identify(cid(1), Identify::new("p1").with_name("Ana"), tx);

    assert_eq!(result.unwrap(), Matched::Waiting);
    assert_eq!(
        drain(&mut rx),
        vec![ServerMessage::waiting(id("p1"), Some("Ana".into()))]
    );
    assert_eq!(broker.phase(&id("p1")), ClientPhase::Waiting);
}

#[test]
fn test_second_identify_pairs_both_with_tailored_views() {
    let mut broker = Broker::new(BrokerConfig::default());
    let (tx1, mut p1) = mpsc::unbounded_channel();
    let (tx2, mut p2) = mpsc::unbounded_channel();
    broker
        .identify(cid(1), Identify::new("p1").with_name("Ana"), tx1)
        .unwrap();
    drain(&mut p1);

    let result = broker
        .identify(cid(2), Identify::new("p2").with_name("Bo"), tx2)
        .unwrap();

    let Matched::Paired { room_id, opponent } = result else {
        panic!("expected pairing");
    };
    assert_eq!(opponent, id("p1"));

    let to_p1 = drain(&mut p1);
    let to_p2 = drain(&mut p2);
    assert_eq!(to_p1.len(), 1);
    assert_eq!(to_p2.len(), 1);

    assert_eq!(
        to_p1[0],
        ServerMessage::Status(StatusMessage::Connected {
            room_id: room_id.clone(),
            device_id: id("p1"),
            opponent_device_id: id("p2"),
            device_id_name: Some("Ana".into()),
            opponent_device_id_name: Some("Bo".into()),
        })
    );
    assert_eq!(
        to_p2[0],
        ServerMessage::Status(StatusMessage::Connected {
            room_id: room_id.clone(),
            device_id: id("p2"),
            opponent_device_id: id("p1"),
            device_id_name: Some("Bo".into()),
            opponent_device_id_name: Some("Ana".into()),
        })
    );

    assert_eq!(broker.phase(&id("p1")), ClientPhase::Paired(room_id.clone()));
    assert_eq!(broker.phase(&id("p2")), ClientPhase::Paired(room_id));
    assert_eq!(broker.stats().waiting, 0);
    assert_eq!(broker.stats().rooms, 1);
}

#[test]
fn test_pairing_is_fifo_oldest_waiter_first() {
    let mut broker = Broker::new(BrokerConfig::default());

    let (_, _a) = join(&mut broker, 1, "A");
    let (r, _b) = join(&mut broker, 2, "B");
    assert!(matches!(r, Ok(Matched::Paired { ref opponent, .. }) if *opponent == id("A")));
    let (_, _c) = join(&mut broker, 3, "C");
    let (r, _d) = join(&mut broker, 4, "D");
    assert!(matches!(r, Ok(Matched::Paired { ref opponent, .. }) if *opponent == id("C")));
}

#[test]
fn test_room_id_collision_restores_waiter_at_head() {
    let mut ids = vec![RoomId::new("dup"), RoomId::new("dup"), RoomId::new("fresh")].into_iter();
    let mut broker = Broker::with_room_ids(
        BrokerConfig::default(),
        Box::new(move || ids.next().unwrap_or_else(|| RoomId::new("spare"))),
    );

    let (_, _x) = join(&mut broker, 1, "X");
    let (r, _y) = join(&mut broker, 2, "Y");
    assert!(matches!(r, Ok(Matched::Paired { .. })));
    let (_, _z) = join(&mut broker, 3, "Z");

    let (r, mut w) = join(&mut broker, 4, "W");

    assert!(matches!(r, Err(BrokerError::RoomIdCollision(ref room)) if room.as_str() == "dup"));
    assert_eq!(drain(&mut w), vec![ServerMessage::error("Room allocation failed.")]);
    assert_eq!(broker.waiting().cloned().collect::<Vec<_>>(), vec![id("Z")]);
    assert_eq!(broker.phase(&id("W")), ClientPhase::Unidentified);
    assert_eq!(broker.stats().rooms, 1);

    let (r, _v) = join(&mut broker, 5, "V");
    assert!(matches!(r, Ok(Matched::Paired { ref opponent, .. }) if *opponent == id("Z")));
}

#[test]
fn test_room_ids_are_unique_across_pairings() {
    let mut broker = Broker::new(BrokerConfig::default());
    let mut seen = std::collections::HashSet::new();
    for pair in 0..20u64 {
        let (_, _a) = join(&mut broker, pair * 2 + 1, &format!("a{pair}"));
        let (r, _b) = join(&mut broker, pair * 2 + 2, &format!("b{pair}"));
        let Ok(Matched::Paired { room_id, .. }) = r else {
            panic!("expected pairing");
        };
        assert!(seen.insert(room_id), "room id reused");
    }
}

#[test]
fn test_duplicate_identity_rejected_without_touching_state() {
    let mut broker = Broker::new(BrokerConfig::default());
    let (room_id, _p1, _p2) = paired(&mut broker);
    let (_, _p3) = join(&mut broker, 3, "p3");
    let before = broker.stats();

    let (result, mut dup) = join(&mut broker, 9, "p1");

    assert!(matches!(result, Err(BrokerError::AlreadyConnected(ref d)) if *d == id("p1")));
    assert_eq!(drain(&mut dup), vec![ServerMessage::error("Already connected.")]);
    assert_eq!(broker.stats(), before);
    assert_eq!(broker.phase(&id("p1")), ClientPhase::Paired(room_id));
    assert_eq!(broker.waiting().cloned().collect::<Vec<_>>(), vec![id("p3")]);
    // The rejected connection is still unidentified and may retry.
    assert!(broker.identity_of(cid(9)).is_none());
    let (retry, _) = join(&mut broker, 9, "p4");
    assert!(matches!(retry, Ok(Matched::Paired { .. })));
}

#[test]
fn test_duplicate_identity_of_waiting_client_not_queued_twice() {
    let mut broker = Broker::new(BrokerConfig::default());
    let (_, _p1) = join(&mut broker, 1, "p1");

    let (result, _) = join(&mut broker, 2, "p1");

    assert!(result.is_err());
    assert_eq!(broker.stats().waiting, 1);
    assert_eq!(broker.stats().rooms, 0);
}

#[test]
fn test_second_identify_on_same_connection_is_rejected() {
    let mut broker = Broker::new(BrokerConfig::default());
    let (_, mut p1) = join(&mut broker, 1, "p1");
    drain(&mut p1);

    let (tx, mut again) = mpsc::unbounded_channel();
    let result = broker.identify(cid(1), Identify::new("other"), tx);

    assert!(matches!(result, Err(BrokerError::AlreadyIdentified(_, _))));
    assert_eq!(drain(&mut again), vec![ServerMessage::error("Already identified.")]);
    assert_eq!(broker.phase(&id("other")), ClientPhase::Unidentified);
    assert_eq!(broker.stats().waiting, 1);
}

// =========================================================================
// Relay
// =========================================================================

#[test]
fn test_relay_reaches_peer_only_and_is_verbatim() {
    let mut broker = Broker::new(BrokerConfig::default());
    let (room_id, mut p1, mut p2) = paired(&mut broker);

    let outcome = broker.relay(cid(1), position("p1", 1, 2));

    assert_eq!(
        outcome,
        RelayOutcome::Delivered {
            room_id,
            recipients: 1
        }
    );
    assert_eq!(drain(&mut p2), vec![ServerMessage::Relay(position("p1", 1, 2))]);
    assert!(drain(&mut p1).is_empty(), "sender must not get its own event");
}

#[test]
fn test_relay_retags_with_connection_identity() {
    let mut broker = Broker::new(BrokerConfig::default());
    let (_, _p1, mut p2) = paired(&mut broker);

    broker.relay(cid(1), position("someone-else", 3, 4));

    let got = drain(&mut p2);
    assert_eq!(got, vec![ServerMessage::Relay(position("p1", 3, 4))]);
}

#[test]
fn test_relay_all_members_scope_echoes_to_sender() {
    let config = BrokerConfig::default().with_relay(
        RelayPolicy::default().with_scope(EventKind::ScoreAndStrength, RelayScope::AllMembers),
    );
    let mut broker = Broker::new(config);
    let (_, mut p1, mut p2) = paired(&mut broker);

    let outcome = broker.relay(cid(2), score("p2"));

    assert!(matches!(outcome, RelayOutcome::Delivered { recipients: 2, .. }));
    assert_eq!(drain(&mut p1), vec![ServerMessage::Relay(score("p2"))]);
    assert_eq!(drain(&mut p2), vec![ServerMessage::Relay(score("p2"))]);

    // Other kinds keep the peers-only default.
    broker.relay(cid(2), position("p2", 0, 0));
    assert_eq!(drain(&mut p1).len(), 1);
    assert!(drain(&mut p2).is_empty());
}

#[test]
fn test_relay_from_waiting_or_unidentified_is_dropped() {
    let mut broker = Broker::new(BrokerConfig::default());
    let (_, mut p1) = join(&mut broker, 1, "p1");
    drain(&mut p1);

    assert_eq!(broker.relay(cid(1), position("p1", 0, 0)), RelayOutcome::NotPaired);
    assert_eq!(broker.relay(cid(42), position("x", 0, 0)), RelayOutcome::NotPaired);
    assert!(drain(&mut p1).is_empty());
}

#[test]
fn test_relay_to_dead_peer_is_dropped_silently() {
    let mut broker = Broker::new(BrokerConfig::default());
    let (_, _p1, p2) = paired(&mut broker);
    drop(p2); // p2's writer died but its close hasn't been processed yet

    let outcome = broker.relay(cid(1), position("p1", 5, 5));

    assert!(matches!(outcome, RelayOutcome::Delivered { recipients: 0, .. }));
}

// =========================================================================
// Disconnect
// =========================================================================

#[test]
fn test_disconnect_waiting_client_leaves_pool_silently() {
    let mut broker = Broker::new(BrokerConfig::default());
    let (_, mut p1) = join(&mut broker, 1, "p1");
    drain(&mut p1);

    let departure = broker.disconnect(cid(1));

    assert_eq!(departure, Departure::LeftQueue(id("p1")));
    assert!(drain(&mut p1).is_empty());
    assert_eq!(broker.stats(), Default::default());

    // Next arrival waits instead of pairing with a ghost.
    let (r, _) = join(&mut broker, 2, "p2");
    assert_eq!(r.unwrap(), Matched::Waiting);
}

#[test]
fn test_disconnect_unidentified_connection_is_noop() {
    let mut broker = Broker::new(BrokerConfig::default());
    let (_, _p1) = join(&mut broker, 1, "p1");

    assert_eq!(broker.disconnect(cid(7)), Departure::Unidentified);
    assert_eq!(broker.stats().registered, 1);
}

#[test]
fn test_room_collapse_notifies_and_clears_both_members() {
    let mut broker = Broker::new(BrokerConfig::default());
    let (room_id, mut p1, _p2) = paired(&mut broker);

    let departure = broker.disconnect(cid(2));

    assert_eq!(
        departure,
        Departure::LeftRoom {
            identity: id("p2"),
            room_id: room_id.clone(),
            room_closed: true,
        }
    );
    assert_eq!(
        drain(&mut p1),
        vec![ServerMessage::Notice(Notice::RoomDeleted {
            room_id: room_id.clone(),
            disconnected_device_id: id("p2"),
            is_game_over: true,
        })]
    );
    assert!(broker.room(&room_id).is_none());
    assert_eq!(broker.stats(), Default::default());
    assert_eq!(broker.phase(&id("p1")), ClientPhase::Unidentified);

    // A stale relay from the survivor is a no-op.
    assert_eq!(broker.relay(cid(1), position("p1", 9, 9)), RelayOutcome::NotPaired);
    assert!(drain(&mut p1).is_empty());

    // The survivor's later close is harmless.
    assert_eq!(broker.disconnect(cid(1)), Departure::Unidentified);
}

#[test]
fn test_room_collapse_survivor_can_rematch() {
    let mut broker = Broker::new(BrokerConfig::default());
    let (_, mut p1, _p2) = paired(&mut broker);
    broker.disconnect(cid(2));
    drain(&mut p1);

    let (tx, mut again) = mpsc::unbounded_channel();
    let result = broker.identify(cid(1), Identify::new("p1"), tx);

    assert_eq!(result.unwrap(), Matched::Waiting);
    assert_eq!(drain(&mut again).len(), 1);
}

#[test]
fn test_partner_notify_keeps_room_until_last_member_leaves() {
    let config = BrokerConfig::default().with_teardown(TeardownPolicy::PartnerNotify);
    let mut broker = Broker::new(config);
    let (room_id, mut p1, _p2) = paired(&mut broker);

    let departure = broker.disconnect(cid(2));

    assert_eq!(
        departure,
        Departure::LeftRoom {
            identity: id("p2"),
            room_id: room_id.clone(),
            room_closed: false,
        }
    );
    assert_eq!(
        drain(&mut p1),
        vec![ServerMessage::player_disconnected(id("p2"))]
    );
    assert!(broker.room(&room_id).is_some());
    assert_eq!(broker.phase(&id("p1")), ClientPhase::Paired(room_id.clone()));
    assert_eq!(broker.stats().registered, 1);

    // Relay into the half-empty room finds nobody to deliver to.
    assert!(matches!(
        broker.relay(cid(1), position("p1", 1, 1)),
        RelayOutcome::Delivered { recipients: 0, .. }
    ));

    // p2's identity is free again while p1 still holds the room.
    let (r, mut new_p2) = join(&mut broker, 3, "p2");
    assert_eq!(r.unwrap(), Matched::Waiting);
    drain(&mut new_p2);

    // The returning p2 is a different client and must not get p1's traffic.
    broker.relay(cid(1), position("p1", 2, 2));
    let last = broker.disconnect(cid(1));
    assert!(matches!(last, Departure::LeftRoom { room_closed: true, .. }));
    assert!(drain(&mut new_p2).is_empty());
    assert_eq!(broker.phase(&id("p2")), ClientPhase::Waiting);
    assert!(broker.room(&room_id).is_none());
    assert_eq!(broker.stats().rooms, 0);
}

#[test]
fn test_partner_notify_last_leaver_closes_room() {
    let config = BrokerConfig::default().with_teardown(TeardownPolicy::PartnerNotify);
    let mut broker = Broker::new(config);
    let (room_id, _p1, _p2) = paired(&mut broker);
    broker.disconnect(cid(2));

    let last = broker.disconnect(cid(1));
    assert!(matches!(last, Departure::LeftRoom { room_closed: true, .. }));
    assert!(broker.room(&room_id).is_none());
    assert_eq!(broker.stats().rooms, 0);
}

#[test]
fn test_many_cycles_leave_no_residue() {
    let mut broker = Broker::new(BrokerConfig::default());
    for round in 0..50u64 {
        let base = round * 3;
        let (_, _a) = join(&mut broker, base + 1, "a");
        let (_, _b) = join(&mut broker, base + 2, "b");
        let (_, _c) = join(&mut broker, base + 3, "c");
        broker.disconnect(ConnectionId::new(base + 3));
        broker.disconnect(ConnectionId::new(base + 1));
        broker.disconnect(ConnectionId::new(base + 2));
    }
    assert_eq!(broker.stats(), Default::default());
}

// =========================================================================
// Wait timeout
// =========================================================================

#[test]
fn test_expire_waiting_evicts_and_notifies() {
    let config = BrokerConfig::default().with_wait_timeout(Duration::from_secs(30));
    let mut broker = Broker::new(config);
    let (_, mut p1) = join(&mut broker, 1, "p1");
    drain(&mut p1);

    assert!(broker.expire_waiting(Instant::now()).is_empty());
    let evicted = broker.expire_waiting(Instant::now() + Duration::from_secs(31));

    assert_eq!(evicted, vec![id("p1")]);
    assert_eq!(drain(&mut p1), vec![ServerMessage::timeout(id("p1"))]);
    assert_eq!(broker.stats(), Default::default());
    assert!(broker.identity_of(cid(1)).is_none());
}

#[test]
fn test_expire_waiting_disabled_by_default() {
    let mut broker = Broker::new(BrokerConfig::default());
    let (_, _p1) = join(&mut broker, 1, "p1");

    let evicted = broker.expire_waiting(Instant::now() + Duration::from_secs(86_400));

    assert!(evicted.is_empty());
    assert_eq!(broker.stats().waiting, 1);
}

// =========================================================================
// Actor
// =========================================================================

#[tokio::test]
async fn test_actor_scenario_pair_relay_collapse() {
    let handle = spawn_broker(BrokerConfig::default());
    let (tx1, mut p1) = mpsc::unbounded_channel();
    let (tx2, mut p2) = mpsc::unbounded_channel();

    let first = handle.identify(cid(1), Identify::new("p1"), tx1).await.unwrap();
    assert_eq!(first, Matched::Waiting);
    assert!(matches!(
        p1.recv().await.unwrap(),
        ServerMessage::Status(StatusMessage::Waiting { .. })
    ));

    let second = handle.identify(cid(2), Identify::new("p2"), tx2).await.unwrap();
    let Matched::Paired { room_id, .. } = second else {
        panic!("expected pairing");
    };
    let (room_a, me_a, opp_a) = connected_room(&p1.recv().await.unwrap());
    let (room_b, me_b, opp_b) = connected_room(&p2.recv().await.unwrap());
    assert_eq!(room_a, room_id);
    assert_eq!(room_b, room_id);
    assert_eq!((me_a, opp_a), (id("p1"), id("p2")));
    assert_eq!((me_b, opp_b), (id("p2"), id("p1")));

    handle.relay(cid(1), position("p1", 1, 2)).await.unwrap();
    assert_eq!(
        p2.recv().await.unwrap(),
        ServerMessage::Relay(position("p1", 1, 2))
    );

    handle.disconnect(cid(2)).await.unwrap();
    assert!(matches!(
        p1.recv().await.unwrap(),
        ServerMessage::Notice(Notice::RoomDeleted { .. })
    ));

    handle.relay(cid(1), position("p1", 3, 3)).await.unwrap();
    let stats = handle.stats().await.unwrap();
    assert_eq!(stats, Default::default());
    assert!(p1.try_recv().is_err());
}

#[tokio::test]
async fn test_actor_concurrent_identifies_form_exactly_one_room() {
    let handle = spawn_broker(BrokerConfig::default());

    let mut tasks = Vec::new();
    for n in 1..=2u64 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            let (tx, rx) = mpsc::unbounded_channel();
            let result = handle
                .identify(cid(n), Identify::new(format!("p{n}")), tx)
                .await;
            (result, rx)
        }));
    }

    let mut outcomes = Vec::new();
    let mut inboxes = Vec::new();
    for task in tasks {
        let (result, rx) = task.await.unwrap();
        outcomes.push(result.unwrap());
        inboxes.push(rx);
    }

    let waiting = outcomes.iter().filter(|m| **m == Matched::Waiting).count();
    assert_eq!(waiting, 1);
    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.rooms, 1);
    assert_eq!(stats.waiting, 0);
}

#[tokio::test]
async fn test_actor_wait_timeout_sweeps_pool() {
    let config = BrokerConfig::default().with_wait_timeout(Duration::from_millis(60));
    let handle = spawn_broker(config);
    let (tx, mut rx) = mpsc::unbounded_channel();
    handle.identify(cid(1), Identify::new("p1"), tx).await.unwrap();
    rx.recv().await.unwrap(); // waiting

    let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timeout notice in time")
        .expect("channel open");

    assert_eq!(msg, ServerMessage::timeout(id("p1")));
    assert_eq!(handle.stats().await.unwrap().waiting, 0);
}

#[tokio::test]
async fn test_actor_shutdown_makes_handle_unavailable() {
    let handle = spawn_broker_with(Broker::new(BrokerConfig::default()));
    handle.shutdown().await.unwrap();

    // Give the actor a moment to drop its receiver.
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(matches!(handle.stats().await, Err(BrokerError::Unavailable)));
}
