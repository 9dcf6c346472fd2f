//! End-to-end room flow through the wire protocol

use std::sync::Arc;

use arena_server::combat::{CombatContext, LocalArena, Vec2, WeaponCatalog};
use arena_server::game::{RoomError, RoomRegistry, RoomRules};
use arena_server::ws::handler::handle_client_msg;
use arena_server::ws::protocol::{ClientMsg, RoomStatus, ServerMsg};
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

fn registry() -> Arc<RoomRegistry> {
    Arc::new(RoomRegistry::new(
        Arc::new(WeaponCatalog::builtin()),
        RoomRules::default(),
    ))
}

fn wire(value: serde_json::Value) -> ClientMsg {
    serde_json::from_value(value).unwrap()
}

fn drain(rx: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
    let mut msgs = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        msgs.push(msg);
    }
    msgs
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Host creates, guest joins, both ready, host starts
async fn started_match(
    rooms: &Arc<RoomRegistry>,
) -> (Uuid, Uuid, Uuid, mpsc::Receiver<ServerMsg>, mpsc::Receiver<ServerMsg>) {
    let host = Uuid::new_v4();
    let guest = Uuid::new_v4();
    let mut host_rx = rooms.connect(host);
    let mut guest_rx = rooms.connect(guest);

    handle_client_msg(
        rooms,
        host,
        wire(json!({ "type": "create_room", "nickname": "Ann", "character": "knight" })),
    )
    .await
    .unwrap();
    let room_id = rooms.room_of(host).unwrap();

    handle_client_msg(
        rooms,
        guest,
        wire(json!({
            "type": "join_room",
            "room_id": room_id,
            "nickname": "Bo",
            "character": "rogue"
        })),
    )
    .await
    .unwrap();

    for player in [host, guest] {
        handle_client_msg(rooms, player, wire(json!({ "type": "ready" })))
            .await
            .unwrap();
    }
    handle_client_msg(rooms, host, wire(json!({ "type": "start_match" })))
        .await
        .unwrap();
    settle().await;

    assert!(drain(&mut host_rx)
        .iter()
        .any(|m| matches!(m, ServerMsg::StartGame { players, .. } if players.len() == 2)));
    assert!(drain(&mut guest_rx)
        .iter()
        .any(|m| matches!(m, ServerMsg::StartGame { .. })));

    (room_id, host, guest, host_rx, guest_rx)
}

#[tokio::test]
async fn test_kill_is_scored_once() {
    let rooms = registry();
    let (room_id, host, guest, mut host_rx, mut guest_rx) = started_match(&rooms).await;
    assert_eq!(rooms.get(&room_id).unwrap().summary().status, RoomStatus::Playing);

    for _ in 0..3 {
        handle_client_msg(
            &rooms,
            host,
            wire(json!({ "type": "player_damage", "target_id": guest, "amount": 50.0 })),
        )
        .await
        .unwrap();
    }
    settle().await;

    let msgs = drain(&mut guest_rx);
    let hp: Vec<f32> = msgs
        .iter()
        .filter_map(|m| match m {
            ServerMsg::HpUpdate { player_id, hp, .. } if *player_id == guest => Some(*hp),
            _ => None,
        })
        .collect();
    assert_eq!(hp[..2], [50.0, 0.0]);

    let kills = msgs
        .iter()
        .filter(|m| matches!(m, ServerMsg::PlayerKilled { victim_id, .. } if *victim_id == guest))
        .count();
    assert_eq!(kills, 1);

    let scores = drain(&mut host_rx)
        .into_iter()
        .filter_map(|m| match m {
            ServerMsg::UpdateScores { scores } => Some(scores),
            _ => None,
        })
        .last()
        .unwrap();
    let ann = scores.iter().find(|s| s.player_id == host).unwrap();
    let bo = scores.iter().find(|s| s.player_id == guest).unwrap();
    assert_eq!((ann.kills, ann.deaths), (1, 0));
    assert_eq!((bo.kills, bo.deaths), (0, 1));
}

#[tokio::test]
async fn test_local_hit_report_round_trips_through_room() {
    let rooms = registry();
    let (_, host, guest, _host_rx, mut guest_rx) = started_match(&rooms).await;

    // Host's client simulates its swing against a proxy of the guest
    let mut arena = LocalArena::new(CombatContext::new(Arc::clone(rooms.catalog())));
    let me = arena.spawn_player(host, Vec2::ZERO);
    arena.spawn_remote(guest, Vec2::new(0.0, 1.0), 100.0);
    arena.trigger_attack(me).unwrap();

    let mut reports = Vec::new();
    for _ in 0..120 {
        reports.extend(arena.tick(1.0 / 60.0).reports);
    }
    assert_eq!(reports.len(), 1);

    let report = reports[0];
    handle_client_msg(
        &rooms,
        host,
        ClientMsg::PlayerDamage {
            target_id: report.target,
            amount: report.amount,
            attacker_id: Some(report.attacker),
        },
    )
    .await
    .unwrap();
    settle().await;

    let hp = drain(&mut guest_rx)
        .into_iter()
        .find_map(|m| match m {
            ServerMsg::HpUpdate { player_id, hp, .. } if player_id == guest => Some(hp),
            _ => None,
        })
        .unwrap();
    assert_eq!(hp, 100.0 - report.amount);

    arena.apply_hp_update(guest, hp);
}

#[tokio::test]
async fn test_late_join_is_rejected() {
    let rooms = registry();
    let (room_id, ..) = started_match(&rooms).await;

    let late = Uuid::new_v4();
    let _rx = rooms.connect(late);
    let err = handle_client_msg(
        &rooms,
        late,
        wire(json!({
            "type": "join_room",
            "room_id": room_id,
            "nickname": "Cy",
            "character": "mage"
        })),
    )
    .await
    .unwrap_err();
    assert_eq!(err, RoomError::GameInProgress);
}

#[tokio::test]
async fn test_host_leaving_promotes_guest() {
    let rooms = registry();
    let (room_id, host, guest, _host_rx, mut guest_rx) = started_match(&rooms).await;

    handle_client_msg(&rooms, host, wire(json!({ "type": "leave_room" })))
        .await
        .unwrap();
    settle().await;

    assert!(drain(&mut guest_rx)
        .iter()
        .any(|m| matches!(m, ServerMsg::HostChanged { host_id } if *host_id == guest)));
    assert_eq!(rooms.room_of(host), None);
    assert_eq!(rooms.room_of(guest), Some(room_id));
}
