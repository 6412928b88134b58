//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Room visibility in the public browser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Listed and joinable by anyone
    #[default]
    Public,
    /// Hidden; joining requires the room code
    Private,
}

/// Room lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Lobby, players readying up
    Waiting,
    /// Round in progress
    Playing,
    /// Round over, scores final
    Ended,
}

/// Settings supplied by the room creator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSettings {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub map: String,
    /// Clamped to 1..=8
    pub max_players: u32,
    #[serde(default)]
    pub visibility: Visibility,
    /// Round duration in seconds
    pub round_time: u32,
    /// Creator's profile
    pub nickname: String,
    pub character: String,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// List public rooms
    GetPublicRooms,

    /// Create a room and become its authority
    CreateRoom(RoomSettings),

    /// Join an existing room
    JoinRoom {
        room_id: String,
        nickname: String,
        character: String,
        /// Typed room code, required for private rooms
        #[serde(default)]
        code: Option<String>,
    },

    /// Leave the current room without disconnecting
    LeaveRoom,

    /// Flip own ready flag
    ToggleReady,

    /// Authority asks to start the round
    StartGame,

    /// Own transform/animation, relayed to the room
    GameUpdate {
        position: [f32; 3],
        rotation: [f32; 3],
        animation: String,
        #[serde(default)]
        equipped_weapon: Option<String>,
        #[serde(default)]
        is_attacking: bool,
    },

    /// Attack animation started
    PlayerAttack {
        animation_name: String,
    },

    /// Client-resolved hit
    PlayerDamage {
        target_id: Uuid,
        damage: f32,
        attacker_id: Uuid,
    },

    /// Client-observed death (falls, hazards)
    PlayerKilled {
        victim_id: Uuid,
        #[serde(default)]
        attacker_id: Option<Uuid>,
    },

    /// A pickup was collected
    WeaponPickedUp {
        weapon_id: Uuid,
    },

    /// A pickup was dropped into the world
    WeaponSpawned {
        pickup: WeaponPickup,
    },

    /// Own weapon changed
    WeaponEquipped {
        weapon_name: String,
    },

    /// Authority adds an AI player
    AddBot,

    /// Authority raises capacity by one
    IncreaseMaxPlayers,

    /// Authority closes a slot, kicking its occupant
    ClosePlayerSlot {
        slot_index: usize,
    },

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
        conn_id: Uuid,
        server_time: u64,
    },

    PublicRoomsList {
        rooms: Vec<RoomSummary>,
    },

    RoomCreated {
        room: RoomInfo,
    },

    RoomJoined {
        room: RoomInfo,
    },

    /// A rejected action; only the originating connection sees it
    RoomError {
        code: String,
        message: String,
    },

    /// Roster changed
    UpdatePlayers {
        players: Vec<RosterEntry>,
        max_players: u32,
        authority_id: Uuid,
    },

    /// Sent to the authority once everyone is ready
    AllPlayersReady,

    /// The previous authority left
    AuthorityChanged {
        authority_id: Uuid,
    },

    /// Round has started
    StartGame {
        players: Vec<PlayerInfo>,
        map: String,
        spawned_weapons: Vec<WeaponPickup>,
        round_time: u32,
    },

    /// Transform/animation of one player
    GameUpdate {
        player_id: Uuid,
        position: [f32; 3],
        rotation: [f32; 3],
        animation: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hp: Option<i32>,
        equipped_weapon: Option<String>,
        is_attacking: bool,
    },

    PlayerAttack {
        player_id: Uuid,
        animation_name: String,
    },

    HpUpdate {
        player_id: Uuid,
        hp: i32,
        attacker_id: Uuid,
    },

    UpdateScores {
        scores: Vec<ScoreEntry>,
    },

    KillFeed {
        attacker_name: String,
        victim_name: String,
        attacker_character: String,
        victim_character: String,
    },

    UpdateTimer {
        seconds_remaining: u32,
    },

    /// Round over
    GameEnd {
        results: Vec<FinalScore>,
    },

    WeaponPickedUp {
        weapon_id: Uuid,
    },

    WeaponSpawned {
        pickup: WeaponPickup,
    },

    PlayerEquippedWeapon {
        player_id: Uuid,
        weapon_name: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

impl ServerMsg {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::RoomError {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Entry in the public room browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub map: String,
    pub players: usize,
    pub max_players: u32,
    pub status: RoomStatus,
}

/// Room identity sent on create/join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: String,
    pub name: String,
    pub map: String,
}

/// Lobby roster entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: Uuid,
    pub nickname: String,
    pub ready: bool,
    pub character: String,
    pub kills: u32,
    pub deaths: u32,
    pub is_bot: bool,
}

/// Full player state in the start payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: Uuid,
    pub nickname: String,
    pub character: String,
    pub equipped_weapon: Option<String>,
    pub hp: i32,
    pub kills: u32,
    pub deaths: u32,
    pub position: [f32; 3],
    pub is_bot: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub id: Uuid,
    pub nickname: String,
    pub kills: u32,
    pub deaths: u32,
}

/// Round summary line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalScore {
    pub nickname: String,
    pub kills: u32,
    pub deaths: u32,
}

/// A weapon lying in the arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponPickup {
    pub id: Uuid,
    pub weapon_name: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}
