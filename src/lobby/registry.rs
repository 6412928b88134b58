//! Room registry - the session state machine
//!
//! Owns every room, the connection-to-room membership map and each room's
//! timer handles. All mutation happens on the lobby task, so nothing here
//! locks. Outgoing messages are queued with their recipients resolved at the
//! moment they are produced and drained by the caller.

use std::collections::HashMap;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::LobbyConfig;
use crate::game::bot::{self, BotAction, ANIM_ATTACK, ANIM_IDLE};
use crate::game::catalog::random_weapon_name;
use crate::game::geometry::{random_arena_point, ARENA_HALF_EXTENT};
use crate::game::room::{
    generate_room_code, DamageOutcome, KillRecord, Player, Room, RoomId, MAX_HP, MAX_ROOM_PLAYERS,
};
use crate::util::time::{tick_delta, BOT_ATTACK_RECOVERY_MS, ROUND_TICK_MS};
use crate::ws::protocol::{
    ClientMsg, RoomSettings, RoomStatus, RoomSummary, ServerMsg, Visibility, WeaponPickup,
};

use super::scheduler::{Scheduler, TimerEvent, TimerHandle};

/// Height at which pickups float above the ground
const PICKUP_HEIGHT: f32 = 1.0;

/// Rejected user actions and missing entities
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("Already in this room")]
    AlreadyJoined,

    #[error("Room is full")]
    RoomFull,

    #[error("Game is already in progress")]
    RoomInProgress,

    #[error("Invalid private room code")]
    InvalidPrivateCode,

    #[error("Only the room authority can do that")]
    NotAuthority,

    #[error("Not all players are ready")]
    NotAllReady,

    #[error("A room holds at most {0} players")]
    MaxPlayersReached(u32),

    #[error("Invalid slot")]
    InvalidSlot,

    #[error("Not in a room")]
    NotInRoom,
}

impl RoomError {
    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::RoomNotFound => "room_not_found",
            RoomError::AlreadyJoined => "already_joined",
            RoomError::RoomFull => "room_full",
            RoomError::RoomInProgress => "room_in_progress",
            RoomError::InvalidPrivateCode => "invalid_private_code",
            RoomError::NotAuthority => "not_authority",
            RoomError::NotAllReady => "not_all_ready",
            RoomError::MaxPlayersReached(_) => "max_players_reached",
            RoomError::InvalidSlot => "invalid_slot",
            RoomError::NotInRoom => "not_in_room",
        }
    }

    pub fn to_msg(&self) -> ServerMsg {
        ServerMsg::error(self.code(), self.to_string())
    }
}

/// A message and the connections it goes to
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: Vec<Uuid>,
    pub msg: ServerMsg,
}

/// Pending outgoing messages
#[derive(Debug, Default)]
pub struct Outbox {
    queue: Vec<Outbound>,
}

impl Outbox {
    pub fn to(&mut self, conn_id: Uuid, msg: ServerMsg) {
        self.queue.push(Outbound {
            to: vec![conn_id],
            msg,
        });
    }

    /// Every human in the room
    pub fn to_room(&mut self, room: &Room, msg: ServerMsg) {
        self.push_many(room.human_ids().collect(), msg);
    }

    /// Every human in the room except `except`
    pub fn to_room_except(&mut self, room: &Room, except: Uuid, msg: ServerMsg) {
        self.push_many(room.human_ids().filter(|id| *id != except).collect(), msg);
    }

    fn push_many(&mut self, to: Vec<Uuid>, msg: ServerMsg) {
        if !to.is_empty() {
            self.queue.push(Outbound { to, msg });
        }
    }

    pub fn drain(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.queue)
    }
}

/// Timers a room holds; all of them die with the round or the room
#[derive(Debug, Default)]
pub struct RoomResources {
    bot_tick: Option<TimerHandle>,
    round_timer: Option<TimerHandle>,
    respawns: HashMap<Uuid, TimerHandle>,
    attack_recoveries: HashMap<Uuid, TimerHandle>,
}

impl RoomResources {
    /// Cancel everything; safe to call repeatedly
    pub fn release_all(&mut self) {
        if let Some(mut h) = self.bot_tick.take() {
            h.cancel();
        }
        if let Some(mut h) = self.round_timer.take() {
            h.cancel();
        }
        for (_, mut h) in self.respawns.drain() {
            h.cancel();
        }
        for (_, mut h) in self.attack_recoveries.drain() {
            h.cancel();
        }
    }

    /// Cancel timers tied to one player
    pub fn release_player(&mut self, player_id: &Uuid) {
        if let Some(mut h) = self.respawns.remove(player_id) {
            h.cancel();
        }
        if let Some(mut h) = self.attack_recoveries.remove(player_id) {
            h.cancel();
        }
    }

    pub fn is_idle(&self) -> bool {
        self.bot_tick.is_none()
            && self.round_timer.is_none()
            && self.respawns.is_empty()
            && self.attack_recoveries.is_empty()
    }
}

impl Drop for RoomResources {
    fn drop(&mut self) {
        self.release_all();
    }
}

struct RoomEntry {
    room: Room,
    resources: RoomResources,
}

/// Registry of all rooms (process lifetime)
pub struct RoomRegistry {
    rooms: HashMap<RoomId, RoomEntry>,
    memberships: HashMap<Uuid, RoomId>,
    scheduler: Box<dyn Scheduler>,
    rng: ChaCha8Rng,
    config: LobbyConfig,
    outbox: Outbox,
}

impl RoomRegistry {
    pub fn new(config: LobbyConfig, scheduler: Box<dyn Scheduler>) -> Self {
        Self::with_seed(config, scheduler, rand::random())
    }

    /// Deterministic registry for replay and tests
    pub fn with_seed(config: LobbyConfig, scheduler: Box<dyn Scheduler>, seed: u64) -> Self {
        Self {
            rooms: HashMap::new(),
            memberships: HashMap::new(),
            scheduler,
            rng: ChaCha8Rng::seed_from_u64(seed),
            config,
            outbox: Outbox::default(),
        }
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id).map(|e| &e.room)
    }

    pub fn room_mut(&mut self, room_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(room_id).map(|e| &mut e.room)
    }

    pub fn room_of(&self, conn_id: &Uuid) -> Option<&RoomId> {
        self.memberships.get(conn_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connected_players(&self) -> usize {
        self.memberships.len()
    }

    /// Whether the room still holds any live timer
    pub fn has_timers(&self, room_id: &str) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|e| !e.resources.is_idle())
    }

    /// Take everything queued since the last drain
    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        self.outbox.drain()
    }

    /// Dispatch one inbound command; rejections go back to the sender only
    pub fn handle(&mut self, conn_id: Uuid, msg: ClientMsg) {
        let result = match msg {
            ClientMsg::GetPublicRooms => {
                let rooms = self.list_public_rooms();
                self.outbox.to(conn_id, ServerMsg::PublicRoomsList { rooms });
                Ok(())
            }
            ClientMsg::CreateRoom(settings) => {
                self.create_room(conn_id, settings);
                Ok(())
            }
            ClientMsg::JoinRoom {
                room_id,
                nickname,
                character,
                code,
            } => self.join_room(conn_id, &room_id, nickname, character, code.as_deref()),
            ClientMsg::LeaveRoom => {
                self.leave_room(conn_id);
                Ok(())
            }
            ClientMsg::ToggleReady => self.toggle_ready(conn_id),
            ClientMsg::StartGame => self.start_game(conn_id),
            ClientMsg::GameUpdate {
                position,
                rotation,
                animation,
                equipped_weapon,
                is_attacking,
            } => self.report_position(
                conn_id,
                position,
                rotation,
                animation,
                equipped_weapon,
                is_attacking,
            ),
            ClientMsg::PlayerAttack { animation_name } => {
                self.report_attack(conn_id, animation_name)
            }
            ClientMsg::PlayerDamage {
                target_id,
                damage,
                attacker_id,
            } => self.report_damage(conn_id, target_id, damage, attacker_id),
            ClientMsg::PlayerKilled {
                victim_id,
                attacker_id,
            } => self.report_kill(conn_id, victim_id, attacker_id),
            ClientMsg::WeaponPickedUp { weapon_id } => self.weapon_picked_up(conn_id, weapon_id),
            ClientMsg::WeaponSpawned { pickup } => self.weapon_spawned(conn_id, pickup),
            ClientMsg::WeaponEquipped { weapon_name } => self.equip_weapon(conn_id, weapon_name),
            ClientMsg::AddBot => self.add_bot(conn_id).map(|_| ()),
            ClientMsg::IncreaseMaxPlayers => self.increase_max_players(conn_id),
            ClientMsg::ClosePlayerSlot { slot_index } => {
                self.close_player_slot(conn_id, slot_index)
            }
            ClientMsg::Ping { t } => {
                self.outbox.to(conn_id, ServerMsg::Pong { t });
                Ok(())
            }
        };

        if let Err(e) = result {
            debug!(conn_id = %conn_id, error = %e, "Rejected room action");
            self.outbox.to(conn_id, e.to_msg());
        }
    }

    /// Public rooms for the browser
    pub fn list_public_rooms(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<RoomSummary> = self
            .rooms
            .values()
            .filter(|e| e.room.visibility == Visibility::Public)
            .map(|e| e.room.summary())
            .collect();
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        rooms
    }

    /// Create a room with `conn_id` as its authority. Never fails.
    pub fn create_room(&mut self, conn_id: Uuid, settings: RoomSettings) -> RoomId {
        self.leave_room(conn_id);

        let room_id = loop {
            let code = generate_room_code(&mut self.rng);
            if !self.rooms.contains_key(&code) {
                break code;
            }
        };

        let room = Room::new(room_id.clone(), conn_id, settings);
        info!(
            room_id = %room_id,
            conn_id = %conn_id,
            map = %room.map,
            max_players = room.max_players,
            "Room created"
        );

        self.outbox.to(conn_id, ServerMsg::RoomCreated { room: room.info() });
        self.outbox.to_room(&room, roster_msg(&room));
        self.memberships.insert(conn_id, room_id.clone());
        self.rooms.insert(
            room_id.clone(),
            RoomEntry {
                room,
                resources: RoomResources::default(),
            },
        );

        room_id
    }

    pub fn join_room(
        &mut self,
        conn_id: Uuid,
        room_id: &str,
        nickname: String,
        character: String,
        code: Option<&str>,
    ) -> Result<(), RoomError> {
        {
            let entry = self.rooms.get(room_id).ok_or(RoomError::RoomNotFound)?;
            let room = &entry.room;
            if room.contains(&conn_id) {
                return Err(RoomError::AlreadyJoined);
            }
            if room.is_full() {
                return Err(RoomError::RoomFull);
            }
            if room.status != RoomStatus::Waiting {
                return Err(RoomError::RoomInProgress);
            }
            if room.visibility == Visibility::Private && code != Some(room.id.as_str()) {
                return Err(RoomError::InvalidPrivateCode);
            }
        }

        // One room per connection
        self.leave_room(conn_id);

        let Self {
            rooms,
            memberships,
            outbox,
            ..
        } = self;
        let entry = rooms.get_mut(room_id).ok_or(RoomError::RoomNotFound)?;
        entry
            .room
            .players
            .push(Player::human(conn_id, nickname, character));
        memberships.insert(conn_id, entry.room.id.clone());

        info!(room_id = %room_id, conn_id = %conn_id, "Player joined room");
        outbox.to(conn_id, ServerMsg::RoomJoined { room: entry.room.info() });
        outbox.to_room(&entry.room, roster_msg(&entry.room));
        Ok(())
    }

    /// Remove the connection from its room; the room dies with its last human
    pub fn leave_room(&mut self, conn_id: Uuid) {
        let Some(room_id) = self.memberships.remove(&conn_id) else {
            return;
        };
        let Some(entry) = self.rooms.get_mut(&room_id) else {
            return;
        };

        entry.room.remove_player(&conn_id);
        entry.resources.release_player(&conn_id);
        info!(room_id = %room_id, conn_id = %conn_id, "Player left room");

        if !entry.room.has_humans() {
            self.delete_room(&room_id);
            return;
        }

        if entry.room.is_authority(&conn_id) {
            reassign_authority(&mut entry.room, &mut self.outbox);
        }
        self.outbox.to_room(&entry.room, roster_msg(&entry.room));
    }

    fn delete_room(&mut self, room_id: &str) {
        if let Some(mut entry) = self.rooms.remove(room_id) {
            entry.resources.release_all();
            for id in entry.room.human_ids() {
                self.memberships.remove(&id);
            }
            info!(room_id = %room_id, "Room deleted");
        }
    }

    pub fn toggle_ready(&mut self, conn_id: Uuid) -> Result<(), RoomError> {
        let (entry, outbox) = self.entry_for(conn_id)?;
        let player = entry
            .room
            .player_mut(&conn_id)
            .ok_or(RoomError::NotInRoom)?;
        player.ready = !player.ready;

        outbox.to_room(&entry.room, roster_msg(&entry.room));
        if entry.room.all_ready() && entry.room.is_authority(&conn_id) {
            outbox.to(conn_id, ServerMsg::AllPlayersReady);
        }
        Ok(())
    }

    /// Authority starts the round: pickups, start payload, bot and round timers
    pub fn start_game(&mut self, conn_id: Uuid) -> Result<(), RoomError> {
        let room_id = self
            .memberships
            .get(&conn_id)
            .cloned()
            .ok_or(RoomError::NotInRoom)?;
        let Self {
            rooms,
            scheduler,
            rng,
            config,
            outbox,
            ..
        } = self;
        let entry = rooms.get_mut(&room_id).ok_or(RoomError::RoomNotFound)?;
        let room = &mut entry.room;

        if !room.is_authority(&conn_id) {
            return Err(RoomError::NotAuthority);
        }
        if room.status == RoomStatus::Playing {
            return Err(RoomError::RoomInProgress);
        }
        if !room.all_ready() {
            return Err(RoomError::NotAllReady);
        }

        let pickups = generate_pickups(rng, config.pickup_count);
        room.begin_round(pickups);

        outbox.to_room(
            room,
            ServerMsg::StartGame {
                players: room.players.iter().map(Player::info).collect(),
                map: room.map.clone(),
                spawned_weapons: room.spawned_weapons.clone(),
                round_time: room.round_time,
            },
        );

        let resources = &mut entry.resources;
        resources.release_all();
        resources.bot_tick = Some(scheduler.every(
            config.bot_tick,
            TimerEvent::BotTick {
                room_id: room_id.clone(),
            },
        ));
        resources.round_timer = Some(scheduler.every(
            Duration::from_millis(ROUND_TICK_MS),
            TimerEvent::RoundTick {
                room_id: room_id.clone(),
            },
        ));

        info!(
            room_id = %room_id,
            players = entry.room.players.len(),
            round_time = entry.room.round_time,
            "Game started"
        );
        Ok(())
    }

    /// Authoritative damage with all of its broadcasts and side effects
    pub fn apply_damage(
        &mut self,
        room_id: &str,
        target_id: Uuid,
        amount: f32,
        attacker_id: Uuid,
    ) -> Option<DamageOutcome> {
        let Self {
            rooms,
            scheduler,
            config,
            outbox,
            ..
        } = self;
        let Some(entry) = rooms.get_mut(room_id) else {
            debug!(room_id = %room_id, "Damage for missing room ignored");
            return None;
        };
        let Some(outcome) = entry.room.apply_damage(&target_id, amount, attacker_id) else {
            debug!(room_id = %room_id, target_id = %target_id, "Damage not applied");
            return None;
        };
        publish_damage(entry, &outcome, &mut **scheduler, config, outbox);
        Some(outcome)
    }

    /// Client-resolved hit; trusted as reported
    pub fn report_damage(
        &mut self,
        conn_id: Uuid,
        target_id: Uuid,
        amount: f32,
        attacker_id: Uuid,
    ) -> Result<(), RoomError> {
        let room_id = self
            .memberships
            .get(&conn_id)
            .cloned()
            .ok_or(RoomError::NotInRoom)?;
        self.apply_damage(&room_id, target_id, amount, attacker_id);
        Ok(())
    }

    /// Client-observed death the server has not scored yet
    pub fn report_kill(
        &mut self,
        conn_id: Uuid,
        victim_id: Uuid,
        attacker_id: Option<Uuid>,
    ) -> Result<(), RoomError> {
        let room_id = self
            .memberships
            .get(&conn_id)
            .cloned()
            .ok_or(RoomError::NotInRoom)?;
        let Self {
            rooms,
            scheduler,
            config,
            outbox,
            ..
        } = self;
        let entry = rooms.get_mut(&room_id).ok_or(RoomError::RoomNotFound)?;
        let Some(kill) = entry.room.report_kill(&victim_id, attacker_id) else {
            debug!(room_id = %room_id, victim_id = %victim_id, "Kill report ignored");
            return Ok(());
        };
        let outcome = DamageOutcome {
            target_id: victim_id,
            hp: 0,
            attacker_id: attacker_id.unwrap_or(victim_id),
            kill: Some(kill),
        };
        publish_damage(entry, &outcome, &mut **scheduler, config, outbox);
        Ok(())
    }

    pub fn report_position(
        &mut self,
        conn_id: Uuid,
        position: [f32; 3],
        rotation: [f32; 3],
        animation: String,
        equipped_weapon: Option<String>,
        is_attacking: bool,
    ) -> Result<(), RoomError> {
        let (entry, outbox) = self.entry_for(conn_id)?;
        let player = entry
            .room
            .player_mut(&conn_id)
            .ok_or(RoomError::NotInRoom)?;

        if position.iter().all(|v| v.is_finite()) {
            player.position = glam::Vec3::from_array(position);
        }
        if rotation[1].is_finite() {
            player.yaw = rotation[1];
        }
        player.equipped_weapon = equipped_weapon;
        player.is_attacking = is_attacking;

        let msg = ServerMsg::GameUpdate {
            player_id: conn_id,
            position: player.position.to_array(),
            rotation: player.rotation(),
            animation,
            hp: Some(player.hp),
            equipped_weapon: player.equipped_weapon.clone(),
            is_attacking,
        };
        outbox.to_room_except(&entry.room, conn_id, msg);
        Ok(())
    }

    pub fn report_attack(&mut self, conn_id: Uuid, animation_name: String) -> Result<(), RoomError> {
        let (entry, outbox) = self.entry_for(conn_id)?;
        outbox.to_room_except(
            &entry.room,
            conn_id,
            ServerMsg::PlayerAttack {
                player_id: conn_id,
                animation_name,
            },
        );
        Ok(())
    }

    pub fn weapon_picked_up(&mut self, conn_id: Uuid, weapon_id: Uuid) -> Result<(), RoomError> {
        let (entry, outbox) = self.entry_for(conn_id)?;
        let before = entry.room.spawned_weapons.len();
        entry.room.spawned_weapons.retain(|w| w.id != weapon_id);
        if entry.room.spawned_weapons.len() != before {
            outbox.to_room(&entry.room, ServerMsg::WeaponPickedUp { weapon_id });
        }
        Ok(())
    }

    pub fn weapon_spawned(&mut self, conn_id: Uuid, pickup: WeaponPickup) -> Result<(), RoomError> {
        let (entry, outbox) = self.entry_for(conn_id)?;
        let weapons = &mut entry.room.spawned_weapons;
        weapons.retain(|w| w.id != pickup.id);
        weapons.push(pickup.clone());
        outbox.to_room(&entry.room, ServerMsg::WeaponSpawned { pickup });
        Ok(())
    }

    pub fn equip_weapon(&mut self, conn_id: Uuid, weapon_name: String) -> Result<(), RoomError> {
        let (entry, outbox) = self.entry_for(conn_id)?;
        let player = entry
            .room
            .player_mut(&conn_id)
            .ok_or(RoomError::NotInRoom)?;
        player.equipped_weapon = Some(weapon_name.clone());
        outbox.to_room_except(
            &entry.room,
            conn_id,
            ServerMsg::PlayerEquippedWeapon {
                player_id: conn_id,
                weapon_name,
            },
        );
        Ok(())
    }

    /// Authority adds an AI player while the room is waiting
    pub fn add_bot(&mut self, conn_id: Uuid) -> Result<Uuid, RoomError> {
        let room_id = self
            .memberships
            .get(&conn_id)
            .cloned()
            .ok_or(RoomError::NotInRoom)?;
        let Self {
            rooms, rng, outbox, ..
        } = self;
        let room = &mut rooms.get_mut(&room_id).ok_or(RoomError::RoomNotFound)?.room;

        if !room.is_authority(&conn_id) {
            return Err(RoomError::NotAuthority);
        }
        if room.status != RoomStatus::Waiting {
            return Err(RoomError::RoomInProgress);
        }
        if room.is_full() {
            return Err(RoomError::RoomFull);
        }

        let bot = Player::random_bot(rng);
        let bot_id = bot.id;
        info!(room_id = %room_id, bot = %bot.nickname, bot_id = %bot_id, "Bot added");
        room.players.push(bot);
        outbox.to_room(room, roster_msg(room));
        Ok(bot_id)
    }

    pub fn increase_max_players(&mut self, conn_id: Uuid) -> Result<(), RoomError> {
        let (entry, outbox) = self.entry_for(conn_id)?;
        let room = &mut entry.room;
        if !room.is_authority(&conn_id) {
            return Err(RoomError::NotAuthority);
        }
        if room.max_players >= MAX_ROOM_PLAYERS {
            return Err(RoomError::MaxPlayersReached(MAX_ROOM_PLAYERS));
        }
        room.max_players += 1;
        outbox.to_room(room, roster_msg(room));
        Ok(())
    }

    /// Authority closes a slot; whoever sits there is kicked
    pub fn close_player_slot(&mut self, conn_id: Uuid, slot_index: usize) -> Result<(), RoomError> {
        let room_id = self
            .memberships
            .get(&conn_id)
            .cloned()
            .ok_or(RoomError::NotInRoom)?;
        let entry = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::RoomNotFound)?;
        let room = &mut entry.room;

        if !room.is_authority(&conn_id) {
            return Err(RoomError::NotAuthority);
        }
        if slot_index >= room.max_players as usize {
            return Err(RoomError::InvalidSlot);
        }

        if slot_index < room.players.len() {
            let kicked = room.players.remove(slot_index);
            entry.resources.release_player(&kicked.id);
            if !kicked.is_bot() {
                self.memberships.remove(&kicked.id);
                self.outbox.to(
                    kicked.id,
                    ServerMsg::error("kicked", "Removed from the room by the authority"),
                );
            }
            info!(room_id = %room_id, kicked = %kicked.nickname, "Player slot closed");
        }

        let room = &mut entry.room;
        room.max_players = (room.max_players.saturating_sub(1)).max(room.players.len() as u32);

        if !room.has_humans() {
            self.delete_room(&room_id);
            return Ok(());
        }
        if !room.contains(&room.authority_id) {
            reassign_authority(room, &mut self.outbox);
        }
        self.outbox.to_room(room, roster_msg(room));
        Ok(())
    }

    /// A timer fired. The room may be gone; that is a no-op.
    pub fn on_timer(&mut self, event: TimerEvent) {
        if !self.rooms.contains_key(event.room_id()) {
            debug!(room_id = %event.room_id(), ?event, "Timer for missing room ignored");
            return;
        }
        match event {
            TimerEvent::BotTick { room_id } => self.bot_tick(&room_id),
            TimerEvent::RoundTick { room_id } => self.round_tick(&room_id),
            TimerEvent::BotRespawn { room_id, bot_id } => self.respawn_bot(&room_id, bot_id),
            TimerEvent::AttackRecovered { room_id, bot_id } => {
                if let Some(entry) = self.rooms.get_mut(&room_id) {
                    entry.resources.attack_recoveries.remove(&bot_id);
                    if let Some(bot) = entry.room.player_mut(&bot_id) {
                        bot.is_attacking = false;
                    }
                }
            }
        }
    }

    /// One bot controller step for a room
    pub fn bot_tick(&mut self, room_id: &str) {
        let Self {
            rooms,
            scheduler,
            rng,
            config,
            outbox,
            ..
        } = self;
        let Some(entry) = rooms.get_mut(room_id) else {
            return;
        };
        if entry.room.status != RoomStatus::Playing {
            return;
        }

        let dt = tick_delta(config.bot_tick);
        for action in bot::advance(&mut entry.room, dt, rng) {
            match action {
                BotAction::Update(msg) => outbox.to_room(&entry.room, msg),
                BotAction::Attacked {
                    bot_id, outcome, ..
                } => {
                    outbox.to_room(
                        &entry.room,
                        ServerMsg::PlayerAttack {
                            player_id: bot_id,
                            animation_name: ANIM_ATTACK.to_string(),
                        },
                    );
                    let recovery = scheduler.after(
                        Duration::from_millis(BOT_ATTACK_RECOVERY_MS),
                        TimerEvent::AttackRecovered {
                            room_id: entry.room.id.clone(),
                            bot_id,
                        },
                    );
                    entry.resources.attack_recoveries.insert(bot_id, recovery);
                    if let Some(outcome) = outcome {
                        publish_damage(entry, &outcome, &mut **scheduler, config, outbox);
                    }
                }
            }
        }
    }

    /// One second of round time
    pub fn round_tick(&mut self, room_id: &str) {
        let Some(entry) = self.rooms.get_mut(room_id) else {
            return;
        };
        if entry.room.status != RoomStatus::Playing {
            return;
        }

        if entry.room.timer > 0 {
            entry.room.timer -= 1;
            self.outbox.to_room(
                &entry.room,
                ServerMsg::UpdateTimer {
                    seconds_remaining: entry.room.timer,
                },
            );
        }
        if entry.room.timer == 0 {
            end_round(entry, &mut self.outbox);
        }
    }

    fn respawn_bot(&mut self, room_id: &str, bot_id: Uuid) {
        let Self {
            rooms, rng, outbox, ..
        } = self;
        let Some(entry) = rooms.get_mut(room_id) else {
            return;
        };
        entry.resources.respawns.remove(&bot_id);
        let playing = entry.room.status == RoomStatus::Playing;

        let Some(bot) = entry.room.player_mut(&bot_id) else {
            return;
        };
        let Some(brain) = bot.bot.as_mut() else {
            return;
        };
        brain.respawn_pending = false;
        if !playing {
            return;
        }

        brain.attack_cooldown = 0.0;
        brain.target_id = None;
        brain.wander = None;
        brain.recently_damaged.clear();
        bot.hp = MAX_HP;
        bot.position = random_arena_point(rng, 0.0);
        bot.yaw = 0.0;
        bot.is_attacking = false;

        let hp_msg = ServerMsg::HpUpdate {
            player_id: bot.id,
            hp: bot.hp,
            attacker_id: bot.id,
        };
        let update = ServerMsg::GameUpdate {
            player_id: bot.id,
            position: bot.position.to_array(),
            rotation: bot.rotation(),
            animation: ANIM_IDLE.to_string(),
            hp: Some(bot.hp),
            equipped_weapon: bot.equipped_weapon.clone(),
            is_attacking: false,
        };

        info!(room_id = %room_id, bot_id = %bot_id, "Bot respawned");
        outbox.to_room(&entry.room, hp_msg);
        outbox.to_room(&entry.room, update);
    }

    /// Borrow the sender's room entry together with the outbox
    fn entry_for(&mut self, conn_id: Uuid) -> Result<(&mut RoomEntry, &mut Outbox), RoomError> {
        let room_id = self.memberships.get(&conn_id).ok_or(RoomError::NotInRoom)?;
        let entry = self
            .rooms
            .get_mut(room_id)
            .ok_or(RoomError::RoomNotFound)?;
        Ok((entry, &mut self.outbox))
    }
}

fn roster_msg(room: &Room) -> ServerMsg {
    ServerMsg::UpdatePlayers {
        players: room.roster(),
        max_players: room.max_players,
        authority_id: room.authority_id,
    }
}

/// Hand authority to the first remaining human and tell the room
fn reassign_authority(room: &mut Room, outbox: &mut Outbox) {
    let Some(next) = room.human_ids().next() else {
        return;
    };
    room.authority_id = next;
    info!(room_id = %room.id, authority_id = %next, "Authority reassigned");
    outbox.to_room(room, ServerMsg::AuthorityChanged { authority_id: next });
}

/// Broadcast hp, and on a kill the scoreboard and kill feed; dead bots get a respawn
fn publish_damage(
    entry: &mut RoomEntry,
    outcome: &DamageOutcome,
    scheduler: &mut dyn Scheduler,
    config: &LobbyConfig,
    outbox: &mut Outbox,
) {
    let room = &entry.room;
    outbox.to_room(
        room,
        ServerMsg::HpUpdate {
            player_id: outcome.target_id,
            hp: outcome.hp,
            attacker_id: outcome.attacker_id,
        },
    );

    let Some(kill) = &outcome.kill else {
        return;
    };
    info!(
        room_id = %room.id,
        attacker = %kill.attacker_name,
        victim = %kill.victim_name,
        "Player eliminated"
    );
    outbox.to_room(room, ServerMsg::UpdateScores { scores: room.scores() });
    outbox.to_room(room, kill_feed_msg(kill));

    if kill.victim_is_bot {
        schedule_respawn(entry, outcome.target_id, scheduler, config.bot_respawn_delay);
    }
}

fn kill_feed_msg(kill: &KillRecord) -> ServerMsg {
    ServerMsg::KillFeed {
        attacker_name: kill.attacker_name.clone(),
        victim_name: kill.victim_name.clone(),
        attacker_character: kill.attacker_character.clone(),
        victim_character: kill.victim_character.clone(),
    }
}

/// Arm a respawn unless one is already pending for this bot
fn schedule_respawn(
    entry: &mut RoomEntry,
    bot_id: Uuid,
    scheduler: &mut dyn Scheduler,
    delay: Duration,
) {
    let room_id = entry.room.id.clone();
    let Some(brain) = entry
        .room
        .player_mut(&bot_id)
        .and_then(|p| p.bot.as_mut())
    else {
        return;
    };
    if brain.respawn_pending {
        debug!(room_id = %room_id, bot_id = %bot_id, "Respawn already pending");
        return;
    }
    brain.respawn_pending = true;

    let handle = scheduler.after(delay, TimerEvent::BotRespawn { room_id, bot_id });
    entry.resources.respawns.insert(bot_id, handle);
}

/// Terminal transition for the round
fn end_round(entry: &mut RoomEntry, outbox: &mut Outbox) {
    entry.resources.release_all();
    let room = &mut entry.room;
    room.status = RoomStatus::Ended;
    for player in &mut room.players {
        player.is_attacking = false;
        if let Some(brain) = player.bot.as_mut() {
            brain.respawn_pending = false;
        }
    }

    info!(room_id = %room.id, "Round ended");
    outbox.to_room(room, ServerMsg::GameEnd { results: room.final_scores() });
}

/// Random pickups inside the arena
fn generate_pickups<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<WeaponPickup> {
    (0..count)
        .filter_map(|_| {
            let weapon_name = random_weapon_name(rng)?;
            Some(WeaponPickup {
                id: Uuid::new_v4(),
                weapon_name,
                x: rng.gen_range(-ARENA_HALF_EXTENT..=ARENA_HALF_EXTENT),
                y: PICKUP_HEIGHT,
                z: rng.gen_range(-ARENA_HALF_EXTENT..=ARENA_HALF_EXTENT),
            })
        })
        .collect()
}
