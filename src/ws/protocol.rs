//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::combat::Vec2;

pub const MIN_PLAYERS: u8 = 2;
pub const MAX_PLAYERS: u8 = 8;
pub const MIN_ROUND_SECS: u32 = 60;
pub const MAX_ROUND_SECS: u32 = 600;

/// Whether a room shows up in the public list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    /// Joinable only with the room's access code
    Private,
}

/// Room lifecycle; only moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Ended,
}

impl RoomStatus {
    pub fn can_transition_to(self, next: RoomStatus) -> bool {
        matches!(
            (self, next),
            (RoomStatus::Waiting, RoomStatus::Playing) | (RoomStatus::Playing, RoomStatus::Ended)
        )
    }
}

fn default_map() -> String {
    "arena".to_string()
}

fn default_max_players() -> u8 {
    4
}

fn default_round_time() -> u32 {
    180
}

/// Settings supplied when creating a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSettings {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_map")]
    pub map: String,
    #[serde(default = "default_max_players")]
    pub max_players: u8,
    #[serde(default)]
    pub visibility: Visibility,
    /// Round length in seconds
    #[serde(default = "default_round_time")]
    pub round_time: u32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            name: None,
            map: default_map(),
            max_players: default_max_players(),
            visibility: Visibility::Public,
            round_time: default_round_time(),
        }
    }
}

impl RoomSettings {
    /// Clamp capacity and round time into their allowed ranges
    pub fn clamped(mut self) -> Self {
        self.max_players = self.max_players.clamp(MIN_PLAYERS, MAX_PLAYERS);
        self.round_time = self.round_time.clamp(MIN_ROUND_SECS, MAX_ROUND_SECS);
        self
    }
}

/// Per-frame player state relayed to the rest of the room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerUpdate {
    /// World position `[x, y, z]`
    pub position: [f32; 3],
    /// Yaw in radians
    pub rotation: f32,
    #[serde(default)]
    pub animation: Option<String>,
    pub hp: f32,
    #[serde(default)]
    pub equipped_weapon: Option<String>,
    #[serde(default)]
    pub is_attacking: bool,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Create a room and become its host
    CreateRoom {
        nickname: String,
        character: String,
        #[serde(default)]
        settings: RoomSettings,
    },

    JoinRoom {
        room_id: Uuid,
        nickname: String,
        character: String,
        /// Access code for private rooms
        #[serde(default)]
        code: Option<String>,
    },

    GetPublicRooms,

    /// Toggle ready flag
    Ready,

    /// Host only
    StartMatch,

    /// Host only: kick the member in `index` or close an empty slot
    CloseSlot {
        index: usize,
    },

    /// Host only
    IncreaseMaxPlayers,

    GameUpdate(PlayerUpdate),

    /// Client-predicted hit against another player
    PlayerDamage {
        target_id: Uuid,
        amount: f32,
        #[serde(default)]
        attacker_id: Option<Uuid>,
    },

    /// Respawn timer finished on the client; restores canonical hp if dead
    Respawn,

    WeaponPickedUp {
        uuid: Uuid,
    },

    WeaponSpawned {
        #[serde(default)]
        uuid: Option<Uuid>,
        weapon_id: String,
        position: Vec2,
    },

    LeaveRoom,

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        player_id: Uuid,
        server_time: u64,
    },

    /// Sent to the host only
    RoomCreated {
        room: RoomInfo,
        access_code: Option<String>,
    },

    RoomJoined {
        room: RoomInfo,
    },

    PublicRoomsList {
        rooms: Vec<RoomSummary>,
    },

    /// Roster refresh
    UpdatePlayers {
        players: Vec<MemberInfo>,
        max_players: u8,
        host_id: Uuid,
    },

    PlayerJoined {
        player: MemberInfo,
    },

    PlayerLeft {
        player_id: Uuid,
    },

    HostChanged {
        host_id: Uuid,
    },

    /// Every member is ready; the host may start
    StartPermitted,

    StartGame {
        map: String,
        players: Vec<MemberInfo>,
        weapons: Vec<WeaponSpawn>,
        round_time: u32,
    },

    /// Relayed state of another player
    GameUpdate {
        player_id: Uuid,
        state: PlayerUpdate,
    },

    /// Canonical hp after a damage report
    HpUpdate {
        player_id: Uuid,
        hp: f32,
        attacker_id: Option<Uuid>,
    },

    PlayerKilled {
        victim_id: Uuid,
        attacker_id: Option<Uuid>,
    },

    KillFeed {
        victim: String,
        attacker: Option<String>,
    },

    UpdateScores {
        scores: Vec<ScoreEntry>,
    },

    WeaponPickedUp {
        uuid: Uuid,
        weapon_id: String,
        player_id: Uuid,
    },

    WeaponSpawned {
        weapon: WeaponSpawn,
    },

    UpdateTimer {
        seconds_remaining: u32,
    },

    GameEnd {
        scores: Vec<ScoreEntry>,
    },

    /// Removed from the room by the host
    Kicked {
        room_id: Uuid,
    },

    /// Rejected request, sent to the requester only
    RoomError {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
        server_time: u64,
    },
}

/// Member as shown in rosters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub id: Uuid,
    pub nickname: String,
    pub character: String,
    pub ready: bool,
    pub is_host: bool,
}

/// Full room description for members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: Uuid,
    pub name: String,
    pub map: String,
    pub visibility: Visibility,
    pub status: RoomStatus,
    pub host_id: Uuid,
    pub max_players: u8,
    pub round_time: u32,
    pub players: Vec<MemberInfo>,
}

/// Lobby listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: Uuid,
    pub name: String,
    pub map: String,
    pub visibility: Visibility,
    pub status: RoomStatus,
    pub players: usize,
    pub max_players: u8,
}

/// Weapon lying on the map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponSpawn {
    pub uuid: Uuid,
    pub weapon_id: String,
    pub position: Vec2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub player_id: Uuid,
    pub nickname: String,
    pub kills: u32,
    pub deaths: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_msg_uses_snake_case_tag() {
        let json = r#"{"type":"join_room","room_id":"6f1c2b6e-3f43-4a53-9f0a-2c1d4f5e6a7b","nickname":"ana","character":"knight"}"#;
        let msg: ClientMsg = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMsg::JoinRoom { code: None, .. }));
    }

    #[test]
    fn test_respawn_has_no_payload() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"respawn"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::Respawn));
    }

    #[test]
    fn test_create_room_settings_default() {
        let json = r#"{"type":"create_room","nickname":"ana","character":"knight"}"#;
        let msg: ClientMsg = serde_json::from_str(json).unwrap();
        match msg {
            ClientMsg::CreateRoom { settings, .. } => assert_eq!(settings, RoomSettings::default()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_game_update_flattens_into_tagged_object() {
        let json = r#"{"type":"game_update","position":[1.0,0.0,2.0],"rotation":0.5,"hp":80.0,"is_attacking":true}"#;
        let msg: ClientMsg = serde_json::from_str(json).unwrap();
        match msg {
            ClientMsg::GameUpdate(update) => {
                assert_eq!(update.hp, 80.0);
                assert!(update.is_attacking);
                assert!(update.equipped_weapon.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_room_error_serializes_code() {
        let msg = ServerMsg::RoomError {
            code: "room_full".into(),
            message: "Room is full".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "room_error");
        assert_eq!(value["code"], "room_full");
    }

    #[test]
    fn test_settings_clamp_bounds() {
        let settings = RoomSettings {
            max_players: 20,
            round_time: 5,
            ..RoomSettings::default()
        }
        .clamped();
        assert_eq!(settings.max_players, MAX_PLAYERS);
        assert_eq!(settings.round_time, MIN_ROUND_SECS);
    }

    #[test]
    fn test_status_only_moves_forward() {
        assert!(RoomStatus::Waiting.can_transition_to(RoomStatus::Playing));
        assert!(RoomStatus::Playing.can_transition_to(RoomStatus::Ended));
        assert!(!RoomStatus::Playing.can_transition_to(RoomStatus::Waiting));
        assert!(!RoomStatus::Ended.can_transition_to(RoomStatus::Playing));
        assert!(!RoomStatus::Waiting.can_transition_to(RoomStatus::Ended));
    }
}
