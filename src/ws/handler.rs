//! WebSocket upgrade handler

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{PlayerId, RoomAction, RoomError, RoomRegistry};
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let player_id = Uuid::new_v4();
    info!(player_id = %player_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        player_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(player_id = %player_id, error = %e, "Failed to send welcome");
        return;
    }

    let outbox = state.rooms.connect(player_id);
    let limiter = PlayerRateLimiter::new(state.config.input_rate_limit);

    run_session(player_id, &state.rooms, limiter, ws_sink, ws_stream, outbox).await;

    state.rooms.disconnect(player_id).await;
    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    player_id: PlayerId,
    rooms: &Arc<RoomRegistry>,
    limiter: PlayerRateLimiter,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut outbox: mpsc::Receiver<ServerMsg>,
) {
    // Writer task: room and direct messages -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbox.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(player_id = %player_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> rooms
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !limiter.check_input() {
                    warn!(player_id = %player_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => {
                        if let Err(e) = handle_client_msg(rooms, player_id, msg).await {
                            rooms.notify(
                                player_id,
                                ServerMsg::RoomError {
                                    code: e.code().to_string(),
                                    message: e.to_string(),
                                },
                            );
                        }
                    }
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Route one client message to the room registry
pub async fn handle_client_msg(
    rooms: &Arc<RoomRegistry>,
    player_id: PlayerId,
    msg: ClientMsg,
) -> Result<(), RoomError> {
    match msg {
        ClientMsg::CreateRoom {
            nickname,
            character,
            settings,
        } => rooms
            .create_room(player_id, nickname, character, settings)
            .map(|_| ()),
        ClientMsg::JoinRoom {
            room_id,
            nickname,
            character,
            code,
        } => {
            rooms
                .join_room(player_id, room_id, nickname, character, code)
                .await
        }
        ClientMsg::GetPublicRooms => {
            rooms.notify(
                player_id,
                ServerMsg::PublicRoomsList {
                    rooms: rooms.public_rooms(),
                },
            );
            Ok(())
        }
        ClientMsg::Ready => rooms.act(player_id, RoomAction::Ready).await,
        ClientMsg::StartMatch => rooms.act(player_id, RoomAction::Start).await,
        ClientMsg::CloseSlot { index } => {
            rooms.act(player_id, RoomAction::CloseSlot { index }).await
        }
        ClientMsg::IncreaseMaxPlayers => {
            rooms.act(player_id, RoomAction::IncreaseMaxPlayers).await
        }
        ClientMsg::GameUpdate(update) => {
            rooms.act(player_id, RoomAction::GameUpdate(update)).await
        }
        ClientMsg::PlayerDamage {
            target_id,
            amount,
            attacker_id,
        } => {
            rooms
                .act(
                    player_id,
                    RoomAction::Damage {
                        target: target_id,
                        amount,
                        attacker: attacker_id,
                    },
                )
                .await
        }
        ClientMsg::Respawn => rooms.act(player_id, RoomAction::Respawn).await,
        ClientMsg::WeaponPickedUp { uuid } => {
            rooms.act(player_id, RoomAction::PickupWeapon { uuid }).await
        }
        ClientMsg::WeaponSpawned {
            uuid,
            weapon_id,
            position,
        } => {
            rooms
                .act(
                    player_id,
                    RoomAction::SpawnWeapon {
                        uuid,
                        weapon_id,
                        position,
                    },
                )
                .await
        }
        ClientMsg::LeaveRoom => rooms.leave_room(player_id).await,
        ClientMsg::Ping { t } => {
            rooms.notify(
                player_id,
                ServerMsg::Pong {
                    t,
                    server_time: unix_millis(),
                },
            );
            Ok(())
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::WeaponCatalog;
    use crate::game::RoomRules;
    use crate::ws::protocol::RoomSettings;

    fn registry() -> Arc<RoomRegistry> {
        Arc::new(RoomRegistry::new(
            Arc::new(WeaponCatalog::builtin()),
            RoomRules::default(),
        ))
    }

    #[tokio::test]
    async fn test_ping_answers_with_pong() {
        let rooms = registry();
        let player = Uuid::new_v4();
        let mut rx = rooms.connect(player);

        handle_client_msg(&rooms, player, ClientMsg::Ping { t: 42 })
            .await
            .unwrap();

        match rx.try_recv().unwrap() {
            ServerMsg::Pong { t, .. } => assert_eq!(t, 42),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_room_action_without_room_fails() {
        let rooms = registry();
        let player = Uuid::new_v4();
        let _rx = rooms.connect(player);

        let result = handle_client_msg(&rooms, player, ClientMsg::Ready).await;
        assert_eq!(result, Err(RoomError::RoomNotFound));
    }

    #[tokio::test]
    async fn test_public_rooms_listing() {
        let rooms = registry();
        let host = Uuid::new_v4();
        let viewer = Uuid::new_v4();
        let _host_rx = rooms.connect(host);
        let mut viewer_rx = rooms.connect(viewer);

        handle_client_msg(
            &rooms,
            host,
            ClientMsg::CreateRoom {
                nickname: "host".into(),
                character: "knight".into(),
                settings: RoomSettings::default(),
            },
        )
        .await
        .unwrap();
        handle_client_msg(&rooms, viewer, ClientMsg::GetPublicRooms)
            .await
            .unwrap();

        match viewer_rx.try_recv().unwrap() {
            ServerMsg::PublicRoomsList { rooms } => assert_eq!(rooms.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }
}
