//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::util::time::{BOT_RESPAWN_MS, BOT_TICK_MS};

/// Weapons scattered over the arena when a game starts
pub const DEFAULT_PICKUP_COUNT: usize = 10;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Directory holding the browser client
    pub static_dir: PathBuf,
    /// Allowed client origins for CORS ("*" for any)
    pub client_origin: String,

    /// Lobby tuning
    pub lobby: LobbyConfig,
}

/// Timing knobs for the room registry
#[derive(Clone, Debug)]
pub struct LobbyConfig {
    /// Bot controller period
    pub bot_tick: Duration,
    /// Delay before a dead bot respawns
    pub bot_respawn_delay: Duration,
    /// Number of weapon pickups placed at game start
    pub pickup_count: usize,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            bot_tick: Duration::from_millis(BOT_TICK_MS),
            bot_respawn_delay: Duration::from_millis(BOT_RESPAWN_MS),
            pickup_count: DEFAULT_PICKUP_COUNT,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // PORT wins over SERVER_ADDR so hosted deployments work unchanged
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        };

        let defaults = LobbyConfig::default();
        let bot_tick_ms = parse_or("BOT_TICK_MS", defaults.bot_tick.as_millis() as u64)?;
        let respawn_secs = parse_or("BOT_RESPAWN_SECS", defaults.bot_respawn_delay.as_secs())?;
        let pickup_count = parse_or("PICKUP_COUNT", defaults.pickup_count)?;

        if bot_tick_ms == 0 {
            return Err(ConfigError::Invalid("BOT_TICK_MS"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            static_dir: env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("public")),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            lobby: LobbyConfig {
                bot_tick: Duration::from_millis(bot_tick_ms),
                bot_respawn_delay: Duration::from_secs(respawn_secs),
                pickup_count,
            },
        })
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
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
