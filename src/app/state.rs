//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::lobby::{Lobby, LobbyHandle};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub lobby: LobbyHandle,
}

impl AppState {
    /// Build the state together with the lobby task the caller must spawn
    pub fn new(config: Config) -> (Self, Lobby) {
        let config = Arc::new(config);
        let (lobby, handle) = Lobby::new(config.lobby.clone());

        let state = Self {
            config,
            lobby: handle,
        };
        (state, lobby)
    }
}
