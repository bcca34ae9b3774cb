//! Integration tests for the duel-hall matchmaking service
//!
//! These tests drive the connection manager, matchmaker and rooms together:
//! - Matching scenarios and queue ordering
//! - Disconnect propagation into queues and rooms
//! - Concurrent joins from many tasks
//! - Room id uniqueness and gameplay completion

mod fixtures;

use duel_hall::config::ModeConfig;
use duel_hall::error::MatchmakingError;
use duel_hall::session::DisconnectOutcome;
use duel_hall::types::{
    DepartureReason, GameMode, Membership, RoomOutcome, RoomState, ServerEvent,
};
use futures::future::join_all;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

use fixtures::{TestClient, TestSystem};

#[tokio::test]
async fn test_pair_then_lone_player_waits() {
    let system = TestSystem::new();
    let mode = GameMode::new(0);
    let a = system.connect();
    let b = system.connect();
    let c = system.connect();

    system.connections.join_queue(a.id(), mode).unwrap();
    system.connections.join_queue(b.id(), mode).unwrap();

    let a_rooms = a.events.matched_rooms();
    let b_rooms = b.events.matched_rooms();
    assert_eq!(a_rooms.len(), 1);
    assert_eq!(a_rooms, b_rooms);

    let outcome = system.connections.join_queue(c.id(), mode).unwrap();
    assert_eq!(outcome.position, Some(1));
    assert!(outcome.rooms_created.is_empty());
    assert_eq!(c.events.count_events_of_type("matched"), 0);
    assert_eq!(
        system.connections.membership(c.id()).unwrap(),
        Membership::Queued(mode)
    );

    println!("✅ Pair then lone player scenario passed");
}

#[tokio::test]
async fn test_disconnect_abandons_room_once() {
    let system = TestSystem::new();
    let mode = GameMode::new(0);
    let a = system.connect();
    let b = system.connect();

    system.connections.join_queue(a.id(), mode).unwrap();
    let room_id = system.connections.join_queue(b.id(), mode).unwrap().rooms_created[0];

    let TestClient { handle, events: a_events } = a;
    assert_eq!(
        handle.dispose().unwrap(),
        DisconnectOutcome::AbandonedRoom(room_id)
    );

    let abandoned: Vec<_> = b
        .events
        .events()
        .into_iter()
        .filter(|e| matches!(e, ServerEvent::Abandoned { .. }))
        .collect();
    assert_eq!(
        abandoned,
        vec![ServerEvent::Abandoned {
            room_id,
            reason: DepartureReason::Disconnect
        }]
    );
    assert_eq!(a_events.count_events_of_type("abandoned"), 0);

    assert_eq!(
        system.connections.rooms().snapshot(room_id).unwrap_err(),
        MatchmakingError::RoomNotFound { room_id }
    );
    assert_eq!(
        system.connections.membership(b.id()).unwrap(),
        Membership::None
    );
    assert_eq!(
        system.hook.closed(),
        vec![(room_id, RoomOutcome::Abandoned(DepartureReason::Disconnect))]
    );

    // The survivor can queue again right away
    system.connections.join_queue(b.id(), mode).unwrap();
}

#[tokio::test]
async fn test_fifo_order_across_interior_leave() {
    let system = TestSystem::with_modes(vec![ModeConfig {
        group_size: 3,
        ..ModeConfig::duel(4)
    }]);
    let mode = GameMode::new(4);
    let clients: Vec<_> = (0..4).map(|_| system.connect()).collect();

    system.connections.join_queue(clients[0].id(), mode).unwrap();
    system.connections.join_queue(clients[1].id(), mode).unwrap();
    system.connections.leave_queue(clients[1].id(), mode).unwrap();
    system.connections.join_queue(clients[2].id(), mode).unwrap();
    let outcome = system.connections.join_queue(clients[3].id(), mode).unwrap();

    let room_id = outcome.rooms_created[0];
    let snapshot = system.connections.rooms().snapshot(room_id).unwrap();
    assert_eq!(
        snapshot.occupants,
        vec![clients[0].id(), clients[2].id(), clients[3].id()]
    );
    assert_eq!(
        system.connections.membership(clients[1].id()).unwrap(),
        Membership::None
    );
}

#[tokio::test]
async fn test_leave_after_match_has_no_effect() {
    let system = TestSystem::new();
    let mode = GameMode::new(1);
    let a = system.connect();
    let b = system.connect();

    system.connections.join_queue(a.id(), mode).unwrap();
    let room_id = system.connections.join_queue(b.id(), mode).unwrap().rooms_created[0];

    assert!(matches!(
        system.connections.leave_queue(a.id(), mode),
        Err(MatchmakingError::NotQueued { .. })
    ));
    let snapshot = system.connections.rooms().snapshot(room_id).unwrap();
    assert_eq!(snapshot.state, RoomState::Active);
    assert_eq!(snapshot.occupants.len(), 2);
    assert_eq!(a.events.count_events_of_type("leftQueue"), 0);
}

#[tokio::test]
async fn test_ready_up_then_completion() {
    let system = TestSystem::with_modes(vec![ModeConfig {
        require_ready: true,
        ..ModeConfig::duel(7)
    }]);
    let mode = GameMode::new(7);
    let a = system.connect();
    let b = system.connect();

    system.connections.join_queue(a.id(), mode).unwrap();
    let room_id = system.connections.join_queue(b.id(), mode).unwrap().rooms_created[0];

    assert!(matches!(
        system
            .connections
            .send_room_message(a.id(), room_id, serde_json::json!("too early")),
        Err(MatchmakingError::RoomNotActive { .. })
    ));
    assert_eq!(
        system.connections.acknowledge_ready(a.id(), room_id).unwrap(),
        RoomState::Forming
    );
    assert_eq!(system.hook.active_count(), 0);
    assert_eq!(
        system.connections.acknowledge_ready(b.id(), room_id).unwrap(),
        RoomState::Active
    );
    assert_eq!(a.events.count_events_of_type("roomStarted"), 1);
    assert_eq!(b.events.count_events_of_type("roomStarted"), 1);

    system
        .connections
        .send_room_message(b.id(), room_id, serde_json::json!({"score": 3}))
        .unwrap();
    assert_eq!(a.events.count_events_of_type("roomMessage"), 1);
    assert_eq!(b.events.count_events_of_type("roomMessage"), 0);

    let completion = system.hook.take_completion(room_id).unwrap();
    completion.complete().unwrap();

    assert_eq!(a.events.count_events_of_type("completed"), 1);
    assert_eq!(b.events.count_events_of_type("completed"), 1);
    assert_eq!(
        system.connections.membership(a.id()).unwrap(),
        Membership::None
    );
    assert_eq!(
        system.hook.closed(),
        vec![(room_id, RoomOutcome::Completed)]
    );

    let stats = system.connections.rooms().stats().unwrap();
    assert_eq!(stats.rooms_completed, 1);
    assert_eq!(stats.active_rooms, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_pair_everyone_once() {
    for players in [64usize, 101] {
        let system = Arc::new(TestSystem::new());
        let mode = GameMode::new(0);
        let clients: Vec<_> = (0..players).map(|_| system.connect()).collect();
        let ids: Vec<_> = clients.iter().map(TestClient::id).collect();

        let joins = ids.iter().map(|&session_id| {
            let system = system.clone();
            tokio::spawn(async move { system.connections.join_queue(session_id, mode) })
        });
        let results = join_all(joins).await;

        let mut rooms = HashSet::new();
        for result in results {
            let outcome = result.unwrap().unwrap();
            rooms.extend(outcome.rooms_created);
        }
        assert_eq!(rooms.len(), players / 2);

        let mut seen = HashSet::new();
        for room_id in &rooms {
            let snapshot = system.connections.rooms().snapshot(*room_id).unwrap();
            assert_eq!(snapshot.occupants.len(), 2);
            for occupant in snapshot.occupants {
                assert!(seen.insert(occupant), "session placed in two rooms");
            }
        }

        let waiting = system.connections.matchmaker().queue_len(mode).unwrap();
        assert_eq!(waiting, players % 2);
        for client in &clients {
            assert!(client.events.matched_rooms().len() <= 1);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_disconnects_during_matching() {
    let system = Arc::new(TestSystem::new());
    let mode = GameMode::new(2);
    let clients: Vec<_> = (0..200).map(|_| system.connect()).collect();

    let tasks = clients.into_iter().enumerate().map(|(i, client)| {
        let system = system.clone();
        tokio::spawn(async move {
            let _ = system.connections.join_queue(client.id(), mode);
            if i % 3 == 0 {
                client.handle.dispose().unwrap();
                None
            } else {
                Some(client)
            }
        })
    });
    let survivors: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .filter_map(|result| result.unwrap())
        .collect();

    // Every live room has exactly two live occupants
    for room_id in system.connections.rooms().registry().room_ids().unwrap() {
        let snapshot = system.connections.rooms().snapshot(room_id).unwrap();
        assert_eq!(snapshot.occupants.len(), 2);
        for occupant in snapshot.occupants {
            assert_eq!(
                system.connections.membership(occupant).unwrap(),
                Membership::InRoom(room_id)
            );
        }
    }
    for session_id in system.connections.matchmaker().queued_sessions(mode).unwrap() {
        assert_eq!(
            system.connections.membership(session_id).unwrap(),
            Membership::Queued(mode)
        );
    }
    assert_eq!(
        system.connections.connected_count().unwrap(),
        survivors.len()
    );
}

#[tokio::test]
async fn test_room_ids_unique_over_many_matches() {
    let system = TestSystem::new();
    let mode = GameMode::new(0);
    let mut room_ids = HashSet::new();

    for _ in 0..10_000 {
        let a = system.connect();
        let b = system.connect();
        system.connections.join_queue(a.id(), mode).unwrap();
        let room_id = system.connections.join_queue(b.id(), mode).unwrap().rooms_created[0];
        assert!(room_ids.insert(room_id));
        system.connections.rooms().complete(room_id).unwrap();
    }

    assert_eq!(room_ids.len(), 10_000);
    assert!(system.connections.rooms().registry().is_empty().unwrap());
    assert_eq!(system.connections.connected_count().unwrap(), 0);
}

#[tokio::test]
async fn test_gateway_handler_round_trip() {
    use duel_hall::gateway::{CoreMessageHandler, MessageHandler};

    let system = TestSystem::new();
    let handler = CoreMessageHandler::new(system.connections.clone(), system.metrics.clone());
    let a = system.connect();
    let b = system.connect();

    handler
        .handle_frame(a.id(), r#"{"event":"joinQueue","data":{"mode":0}}"#, 4096)
        .await;
    handler
        .handle_frame(b.id(), r#"{"event":"joinQueue","data":{"mode":0}}"#, 4096)
        .await;
    let room_id = a.events.matched_rooms()[0];

    let frame = serde_json::json!({
        "event": "roomMessage",
        "data": {"roomId": room_id, "payload": {"x": 1}}
    })
    .to_string();
    handler.handle_frame(a.id(), &frame, 4096).await;
    handler.handle_frame(b.id(), &frame, 16).await;

    assert_eq!(b.events.count_events_of_type("roomMessage"), 1);
    assert_eq!(b.events.count_events_of_type("error"), 1);
    assert_eq!(a.events.count_events_of_type("roomMessage"), 0);

    let leave = serde_json::json!({"event": "leaveRoom", "data": {"roomId": room_id}}).to_string();
    handler.handle_frame(b.id(), &leave, 4096).await;
    assert_eq!(a.events.count_events_of_type("abandoned"), 1);
}

#[derive(Debug, Clone)]
enum Action {
    Join(usize),
    Leave(usize),
    Disconnect(usize),
}

fn action_strategy(clients: usize) -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => (0..clients).prop_map(Action::Join),
        1 => (0..clients).prop_map(Action::Leave),
        1 => (0..clients).prop_map(Action::Disconnect),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every popped group is the earliest waiting sessions, and memberships
    /// always agree with the queue and the registry.
    #[test]
    fn prop_fifo_and_exclusive_membership(actions in prop::collection::vec(action_strategy(8), 1..60)) {
        let system = TestSystem::with_modes(vec![ModeConfig {
            group_size: 3,
            ..ModeConfig::duel(0)
        }]);
        let mode = GameMode::new(0);
        let mut clients: Vec<Option<TestClient>> = (0..8).map(|_| Some(system.connect())).collect();
        let mut waiting = Vec::new();

        for action in actions {
            match action {
                Action::Join(i) => {
                    let Some(client) = clients[i].as_ref() else { continue };
                    let session_id = client.id();
                    if let Ok(outcome) = system.connections.join_queue(session_id, mode) {
                        waiting.push(session_id);
                        for room_id in outcome.rooms_created {
                            let snapshot = system.connections.rooms().snapshot(room_id).unwrap();
                            let expected: Vec<_> = waiting.drain(..3).collect();
                            prop_assert_eq!(snapshot.occupants, expected);
                        }
                    }
                }
                Action::Leave(i) => {
                    let Some(client) = clients[i].as_ref() else { continue };
                    let session_id = client.id();
                    if system.connections.leave_queue(session_id, mode).is_ok() {
                        waiting.retain(|id| *id != session_id);
                    }
                }
                Action::Disconnect(i) => {
                    if let Some(client) = clients[i].take() {
                        let session_id = client.id();
                        client.handle.dispose().unwrap();
                        waiting.retain(|id| *id != session_id);
                    }
                }
            }

            prop_assert_eq!(
                system.connections.matchmaker().queued_sessions(mode).unwrap(),
                waiting.clone()
            );
            for client in clients.iter().flatten() {
                match system.connections.membership(client.id()).unwrap() {
                    Membership::None => prop_assert!(!waiting.contains(&client.id())),
                    Membership::Queued(m) => {
                        prop_assert_eq!(m, mode);
                        prop_assert!(waiting.contains(&client.id()));
                    }
                    Membership::InRoom(room_id) => {
                        prop_assert!(!waiting.contains(&client.id()));
                        let snapshot = system.connections.rooms().snapshot(room_id).unwrap();
                        prop_assert!(snapshot.occupants.contains(&client.id()));
                    }
                }
            }
        }
    }
}
