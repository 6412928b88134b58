//! Room and player state (authoritative, owned by the lobby task)

use std::collections::HashSet;

use glam::Vec3;
use rand::Rng;
use uuid::Uuid;

use crate::ws::protocol::{
    FinalScore, PlayerInfo, RoomInfo, RoomSettings, RoomStatus, RoomSummary, RosterEntry,
    ScoreEntry, Visibility, WeaponPickup,
};

use super::catalog::{random_bot_character, random_bot_nickname};
use super::combat::{Damageable, HitHooks, HitKind, HitResolver, TargetId};
use super::geometry::random_arena_point;

pub const MAX_HP: i32 = 100;
pub const MAX_ROOM_PLAYERS: u32 = 8;

/// Room codes are short lowercase tokens players can type
pub type RoomId = String;

const ROOM_CODE_LEN: usize = 6;
const ROOM_CODE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

pub fn generate_room_code<R: Rng + ?Sized>(rng: &mut R) -> RoomId {
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

/// A bot's fallback destination
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WanderGoal {
    pub point: Vec3,
    /// Remaining bot ticks before a new goal is picked
    pub ttl: u32,
}

/// Decision state carried only by bots
#[derive(Debug, Clone, Default)]
pub struct BotBrain {
    pub target_id: Option<Uuid>,
    pub wander: Option<WanderGoal>,
    /// Seconds until the next attack is allowed
    pub attack_cooldown: f32,
    pub tick: u64,
    /// Set while a respawn timer is armed
    pub respawn_pending: bool,
    /// Players this bot has landed a swing on since it last spawned
    pub recently_damaged: HashSet<TargetId>,
}

/// Player state in a room (human or bot)
#[derive(Debug, Clone)]
pub struct Player {
    /// Connection id for humans, generated id for bots
    pub id: Uuid,
    pub nickname: String,
    pub character: String,
    pub ready: bool,
    pub equipped_weapon: Option<String>,
    pub is_attacking: bool,
    pub hp: i32,
    pub kills: u32,
    pub deaths: u32,

    // Transform
    pub position: Vec3,
    pub yaw: f32,

    /// Present for AI-controlled players
    pub bot: Option<BotBrain>,
}

impl Player {
    pub fn human(id: Uuid, nickname: String, character: String) -> Self {
        Self {
            id,
            nickname,
            character,
            ready: false,
            equipped_weapon: None,
            is_attacking: false,
            hp: MAX_HP,
            kills: 0,
            deaths: 0,
            position: Vec3::ZERO,
            yaw: 0.0,
            bot: None,
        }
    }

    /// A ready bot with a random callsign, skin and spawn point
    pub fn random_bot<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let nickname = random_bot_nickname(rng);
        let character = random_bot_character(rng);
        let mut bot = Self::human(Uuid::new_v4(), nickname, character);
        bot.ready = true;
        bot.position = random_arena_point(rng, 0.0);
        bot.bot = Some(BotBrain::default());
        bot
    }

    pub fn is_bot(&self) -> bool {
        self.bot.is_some()
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn rotation(&self) -> [f32; 3] {
        [0.0, self.yaw, 0.0]
    }

    /// Back to full health for a new round
    pub fn reset_for_round(&mut self) {
        self.hp = MAX_HP;
        self.kills = 0;
        self.deaths = 0;
        self.is_attacking = false;
        if let Some(brain) = self.bot.as_mut() {
            *brain = BotBrain::default();
        }
    }

    pub fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            id: self.id,
            nickname: self.nickname.clone(),
            ready: self.ready,
            character: self.character.clone(),
            kills: self.kills,
            deaths: self.deaths,
            is_bot: self.is_bot(),
        }
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.id,
            nickname: self.nickname.clone(),
            character: self.character.clone(),
            equipped_weapon: self.equipped_weapon.clone(),
            hp: self.hp,
            kills: self.kills,
            deaths: self.deaths,
            position: self.position.to_array(),
            is_bot: self.is_bot(),
        }
    }
}

impl Damageable for Player {
    fn target_id(&self) -> TargetId {
        self.id
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn can_take_damage(&self) -> bool {
        self.is_alive()
    }

    fn take_damage(&mut self, amount: f32) {
        if !amount.is_finite() {
            return;
        }
        let amount = amount.max(0.0).round() as i32;
        self.hp = (self.hp.saturating_sub(amount)).clamp(0, MAX_HP);
    }
}

/// Kill-feed details for a lethal hit
#[derive(Debug, Clone, PartialEq)]
pub struct KillRecord {
    /// Credited attacker, absent for self-elimination or unknown attackers
    pub credited: Option<Uuid>,
    pub attacker_name: String,
    pub attacker_character: String,
    pub victim_name: String,
    pub victim_character: String,
    pub victim_is_bot: bool,
}

/// Result of an authoritative damage application
#[derive(Debug, Clone, PartialEq)]
pub struct DamageOutcome {
    pub target_id: Uuid,
    pub hp: i32,
    pub attacker_id: Uuid,
    /// Present when this hit brought hp to zero
    pub kill: Option<KillRecord>,
}

/// A match instance
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub map: String,
    pub visibility: Visibility,
    pub max_players: u32,
    pub status: RoomStatus,
    /// Insertion order is significant
    pub players: Vec<Player>,
    /// May start, resize, close slots and add bots
    pub authority_id: Uuid,
    /// Round duration (seconds)
    pub round_time: u32,
    /// Seconds left in the current round
    pub timer: u32,
    pub spawned_weapons: Vec<WeaponPickup>,
}

impl Room {
    pub fn new(id: RoomId, creator_id: Uuid, settings: RoomSettings) -> Self {
        let creator = Player::human(creator_id, settings.nickname, settings.character);
        Self {
            id,
            name: settings.name,
            map: settings.map,
            visibility: settings.visibility,
            max_players: settings.max_players.clamp(1, MAX_ROOM_PLAYERS),
            status: RoomStatus::Waiting,
            players: vec![creator],
            authority_id: creator_id,
            round_time: settings.round_time,
            timer: settings.round_time,
            spawned_weapons: Vec::new(),
        }
    }

    pub fn index_of(&self, id: &Uuid) -> Option<usize> {
        self.players.iter().position(|p| &p.id == id)
    }

    pub fn player(&self, id: &Uuid) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    pub fn player_mut(&mut self, id: &Uuid) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| &p.id == id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.index_of(id).is_some()
    }

    pub fn is_authority(&self, id: &Uuid) -> bool {
        &self.authority_id == id
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players as usize
    }

    pub fn all_ready(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|p| p.ready)
    }

    /// Connection ids of the humans in the room
    pub fn human_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.players.iter().filter(|p| !p.is_bot()).map(|p| p.id)
    }

    pub fn has_humans(&self) -> bool {
        self.players.iter().any(|p| !p.is_bot())
    }

    pub fn bot_ids(&self) -> Vec<Uuid> {
        self.players.iter().filter(|p| p.is_bot()).map(|p| p.id).collect()
    }

    /// Remove a player, returning it
    pub fn remove_player(&mut self, id: &Uuid) -> Option<Player> {
        let idx = self.index_of(id)?;
        Some(self.players.remove(idx))
    }

    /// Put the room into a fresh round
    pub fn begin_round(&mut self, pickups: Vec<WeaponPickup>) {
        self.status = RoomStatus::Playing;
        self.timer = self.round_time;
        self.spawned_weapons = pickups;
        for player in &mut self.players {
            player.reset_for_round();
        }
    }

    /// Authoritative damage. Ignored outside a round, for unknown targets and
    /// for targets already at zero.
    pub fn apply_damage(
        &mut self,
        target_id: &Uuid,
        amount: f32,
        attacker_id: Uuid,
    ) -> Option<DamageOutcome> {
        if self.status != RoomStatus::Playing {
            return None;
        }
        let target = self.player_mut(target_id)?;
        if !target.can_take_damage() {
            return None;
        }

        let mut already_hit = HashSet::new();
        HitResolver::apply_hit(
            target,
            amount,
            HitKind::Direct,
            &mut already_hit,
            &mut HitHooks::none(),
        );
        Some(self.settle_hit(target_id, attacker_id))
    }

    /// A server-side strike by `attacker_id`. Unlike [`Room::apply_damage`] the
    /// attacker can never hit itself, and targets already in `already_hit`
    /// are skipped.
    pub fn strike(
        &mut self,
        attacker_id: Uuid,
        target_id: &Uuid,
        amount: f32,
        already_hit: &mut HashSet<TargetId>,
        hooks: &mut HitHooks<'_>,
    ) -> Option<DamageOutcome> {
        if self.status != RoomStatus::Playing {
            return None;
        }
        let target = self.player_mut(target_id)?;
        if !HitResolver::is_eligible(attacker_id, already_hit, &*target) {
            return None;
        }

        HitResolver::apply_hit(target, amount, HitKind::Direct, already_hit, hooks);
        Some(self.settle_hit(target_id, attacker_id))
    }

    /// Score the hit that was just applied to `target_id`
    fn settle_hit(&mut self, target_id: &Uuid, attacker_id: Uuid) -> DamageOutcome {
        let hp = self.player(target_id).map_or(0, |p| p.hp);
        let kill = if hp == 0 {
            Some(self.record_kill(target_id, attacker_id))
        } else {
            None
        };

        DamageOutcome {
            target_id: *target_id,
            hp,
            attacker_id,
            kill,
        }
    }

    /// Score a death the server has not seen yet. Returns None when the victim
    /// is unknown or already dead (the lethal hit was scored then).
    pub fn report_kill(&mut self, victim_id: &Uuid, attacker_id: Option<Uuid>) -> Option<KillRecord> {
        if self.status != RoomStatus::Playing {
            return None;
        }
        let victim = self.player_mut(victim_id)?;
        if !victim.is_alive() {
            return None;
        }
        victim.hp = 0;
        let attacker_id = attacker_id.unwrap_or_else(Uuid::nil);
        Some(self.record_kill(victim_id, attacker_id))
    }

    fn record_kill(&mut self, victim_id: &Uuid, attacker_id: Uuid) -> KillRecord {
        let self_kill = &attacker_id == victim_id;

        let (attacker_name, attacker_character, credited) = match self.player_mut(&attacker_id) {
            Some(attacker) if !self_kill => {
                attacker.kills += 1;
                (attacker.nickname.clone(), attacker.character.clone(), Some(attacker.id))
            }
            Some(attacker) => (attacker.nickname.clone(), attacker.character.clone(), None),
            None => ("World".to_string(), "Default".to_string(), None),
        };

        let (victim_name, victim_character, victim_is_bot) = match self.player_mut(victim_id) {
            Some(victim) => {
                victim.deaths += 1;
                (victim.nickname.clone(), victim.character.clone(), victim.is_bot())
            }
            None => ("Unknown".to_string(), "Default".to_string(), false),
        };

        KillRecord {
            credited,
            attacker_name,
            attacker_character,
            victim_name,
            victim_character,
            victim_is_bot,
        }
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            map: self.map.clone(),
        }
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            map: self.map.clone(),
            players: self.players.len(),
            max_players: self.max_players,
            status: self.status,
        }
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        self.players.iter().map(Player::roster_entry).collect()
    }

    pub fn scores(&self) -> Vec<ScoreEntry> {
        self.players
            .iter()
            .map(|p| ScoreEntry {
                id: p.id,
                nickname: p.nickname.clone(),
                kills: p.kills,
                deaths: p.deaths,
            })
            .collect()
    }

    pub fn final_scores(&self) -> Vec<FinalScore> {
        self.players
            .iter()
            .map(|p| FinalScore {
                nickname: p.nickname.clone(),
                kills: p.kills,
                deaths: p.deaths,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn settings(max_players: u32) -> RoomSettings {
        RoomSettings {
            name: "Test".into(),
            map: "forest".into(),
            max_players,
            visibility: Visibility::Public,
            round_time: 60,
            nickname: "host".into(),
            character: "Knight_Male".into(),
        }
    }

    fn playing_room() -> (Room, Uuid, Uuid) {
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let mut room = Room::new("abc123".into(), host, settings(4));
        room.players.push(Player::human(guest, "guest".into(), "Elf".into()));
        room.begin_round(Vec::new());
        (room, host, guest)
    }

    #[test]
    fn test_room_code_shape() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let code = generate_room_code(&mut rng);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_max_players_clamped() {
        assert_eq!(Room::new("a".into(), Uuid::new_v4(), settings(0)).max_players, 1);
        assert_eq!(Room::new("a".into(), Uuid::new_v4(), settings(50)).max_players, 8);
    }

    #[test]
    fn test_hp_clamped_to_zero() {
        let (mut room, host, guest) = playing_room();
        let outcome = room.apply_damage(&guest, 250.0, host).unwrap();
        assert_eq!(outcome.hp, 0);
        assert!(outcome.kill.is_some());
        assert_eq!(room.player(&host).unwrap().kills, 1);
        assert_eq!(room.player(&guest).unwrap().deaths, 1);
    }

    #[test]
    fn test_negative_damage_never_heals_past_max() {
        let (mut room, host, guest) = playing_room();
        let outcome = room.apply_damage(&guest, -40.0, host).unwrap();
        assert_eq!(outcome.hp, MAX_HP);
    }

    #[test]
    fn test_dead_target_is_not_damageable() {
        let (mut room, host, guest) = playing_room();
        room.apply_damage(&guest, 100.0, host).unwrap();
        assert!(room.apply_damage(&guest, 10.0, host).is_none());
        assert_eq!(room.player(&host).unwrap().kills, 1);
    }

    #[test]
    fn test_self_elimination_awards_no_kill() {
        let (mut room, _host, guest) = playing_room();
        let kill = room.apply_damage(&guest, 100.0, guest).unwrap().kill.unwrap();
        assert_eq!(kill.credited, None);
        assert_eq!(kill.attacker_name, "guest");
        let victim = room.player(&guest).unwrap();
        assert_eq!(victim.kills, 0);
        assert_eq!(victim.deaths, 1);
    }

    #[test]
    fn test_strike_goes_through_hit_resolver() {
        let (mut room, host, guest) = playing_room();
        let mut already_hit = HashSet::new();
        let mut recently_damaged = HashSet::new();
        let mut hooks = HitHooks {
            recently_damaged: Some(&mut recently_damaged),
            on_hit: None,
        };

        // Never the striker itself
        assert!(room.strike(host, &host, 15.0, &mut already_hit, &mut hooks).is_none());
        assert_eq!(room.player(&host).unwrap().hp, MAX_HP);

        let outcome = room.strike(host, &guest, 15.0, &mut already_hit, &mut hooks).unwrap();
        assert_eq!(outcome.hp, MAX_HP - 15);
        // Once per attack
        assert!(room.strike(host, &guest, 15.0, &mut already_hit, &mut hooks).is_none());
        assert_eq!(room.player(&guest).unwrap().hp, MAX_HP - 15);

        // Dead targets are not eligible
        room.player_mut(&guest).unwrap().hp = 0;
        assert!(room.strike(host, &guest, 15.0, &mut HashSet::new(), &mut hooks).is_none());
        assert_eq!(room.player(&guest).unwrap().deaths, 0);

        assert!(recently_damaged.contains(&guest));
        assert_eq!(recently_damaged.len(), 1);
    }

    #[test]
    fn test_lethal_strike_scores_the_kill() {
        let (mut room, host, guest) = playing_room();
        let kill = room
            .strike(host, &guest, 150.0, &mut HashSet::new(), &mut HitHooks::none())
            .unwrap()
            .kill
            .unwrap();
        assert_eq!(kill.credited, Some(host));
        assert_eq!(room.player(&host).unwrap().kills, 1);
        assert_eq!(room.player(&guest).unwrap().deaths, 1);
    }

    #[test]
    fn test_unknown_attacker_is_world() {
        let (mut room, _host, guest) = playing_room();
        let kill = room
            .apply_damage(&guest, 100.0, Uuid::new_v4())
            .unwrap()
            .kill
            .unwrap();
        assert_eq!(kill.attacker_name, "World");
        assert_eq!(kill.attacker_character, "Default");
    }

    #[test]
    fn test_damage_ignored_outside_round() {
        let (mut room, host, guest) = playing_room();
        room.status = RoomStatus::Ended;
        assert!(room.apply_damage(&guest, 10.0, host).is_none());
        assert_eq!(room.player(&guest).unwrap().hp, MAX_HP);
    }

    #[test]
    fn test_report_kill_is_not_double_counted() {
        let (mut room, host, guest) = playing_room();
        room.apply_damage(&guest, 100.0, host).unwrap();
        assert!(room.report_kill(&guest, Some(host)).is_none());
        assert_eq!(room.player(&host).unwrap().kills, 1);
        assert_eq!(room.player(&guest).unwrap().deaths, 1);
    }

    #[test]
    fn test_report_kill_for_environmental_death() {
        let (mut room, _host, guest) = playing_room();
        let kill = room.report_kill(&guest, None).unwrap();
        assert_eq!(kill.credited, None);
        assert_eq!(room.player(&guest).unwrap().hp, 0);
        assert_eq!(room.player(&guest).unwrap().deaths, 1);
    }

    #[test]
    fn test_begin_round_resets_scores() {
        let (mut room, host, guest) = playing_room();
        room.apply_damage(&guest, 100.0, host).unwrap();
        room.begin_round(Vec::new());
        let g = room.player(&guest).unwrap();
        assert_eq!((g.hp, g.deaths), (MAX_HP, 0));
        assert_eq!(room.player(&host).unwrap().kills, 0);
        assert_eq!(room.timer, 60);
    }
}
