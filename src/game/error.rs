//! Room operation errors

use crate::combat::CatalogError;

/// Reasons a room request is refused
///
/// Every variant is returned to the requesting connection only and leaves
/// the room untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("Room is full")]
    RoomFull,

    #[error("Game already in progress")]
    GameInProgress,

    #[error("Already in a room")]
    AlreadyInRoom,

    #[error("Invalid private room code")]
    InvalidPrivateCode,

    #[error("Only the host can do that")]
    NotHost,

    #[error("Not all players are ready")]
    AllNotReady,

    #[error("Invalid slot")]
    InvalidSlot,

    #[error("Unknown weapon: {0}")]
    UnknownWeapon(String),

    #[error("Invalid state transition")]
    InvalidTransition,
}

impl RoomError {
    /// Stable identifier sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::RoomNotFound => "room_not_found",
            RoomError::RoomFull => "room_full",
            RoomError::GameInProgress => "game_in_progress",
            RoomError::AlreadyInRoom => "already_in_room",
            RoomError::InvalidPrivateCode => "invalid_private_code",
            RoomError::NotHost => "not_host",
            RoomError::AllNotReady => "all_not_ready",
            RoomError::InvalidSlot => "invalid_slot",
            RoomError::UnknownWeapon(_) => "unknown_weapon",
            RoomError::InvalidTransition => "invalid_transition",
        }
    }
}

impl From<CatalogError> for RoomError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::UnknownWeapon(id) => RoomError::UnknownWeapon(id),
            CatalogError::InvalidArchetype { id, .. } => RoomError::UnknownWeapon(id),
            CatalogError::Io(_) | CatalogError::Parse(_) => {
                RoomError::UnknownWeapon(String::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_weapon_maps_from_catalog() {
        let err: RoomError = CatalogError::UnknownWeapon("laser".into()).into();
        assert_eq!(err, RoomError::UnknownWeapon("laser".into()));
        assert_eq!(err.code(), "unknown_weapon");
    }

    #[test]
    fn test_codes_are_snake_case() {
        let all = [
            RoomError::RoomNotFound,
            RoomError::RoomFull,
            RoomError::GameInProgress,
            RoomError::AlreadyInRoom,
            RoomError::InvalidPrivateCode,
            RoomError::NotHost,
            RoomError::AllNotReady,
            RoomError::InvalidSlot,
            RoomError::InvalidTransition,
        ];
        for err in all {
            assert!(err.code().chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
