//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::game::RoomRules;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma-separated; `*` allows any
    pub client_origin: String,

    /// Optional JSON weapon table replacing the built-in catalog
    pub weapon_data_path: Option<PathBuf>,
    /// Random weapons placed at match start, and the cap for respawns
    pub weapon_spawn_count: usize,
    /// Seconds between periodic weapon spawns
    pub weapon_respawn_secs: u32,

    /// Inbound WebSocket messages allowed per second per connection
    pub input_rate_limit: u32,
    /// Trace hit volume geometry
    pub debug_hitboxes: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            weapon_data_path: env::var("WEAPON_DATA_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            weapon_spawn_count: parse_var("WEAPON_SPAWN_COUNT", 10)?,
            weapon_respawn_secs: parse_var("WEAPON_RESPAWN_SECS", 10)?,

            input_rate_limit: parse_var("INPUT_RATE_LIMIT", 60)?,
            debug_hitboxes: parse_var("DEBUG_HITBOXES", false)?,
        })
    }

    pub fn room_rules(&self) -> RoomRules {
        RoomRules {
            weapon_spawn_count: self.weapon_spawn_count,
            weapon_respawn_secs: self.weapon_respawn_secs,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            client_origin: "*".to_string(),
            weapon_data_path: None,
            weapon_spawn_count: 10,
            weapon_respawn_secs: 10,
            input_rate_limit: 60,
            debug_hitboxes: false,
        }
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
