//! Bot controller - one fixed step of AI for every bot in a room
//!
//! [`advance`] is a pure function of the room, the step length and the RNG, so
//! a room can be replayed deterministically with a seeded generator. Timers
//! and broadcasting live in the lobby.

use std::collections::HashSet;
use std::ops::Range;

use glam::Vec3;
use rand::Rng;
use uuid::Uuid;

use crate::ws::protocol::{RoomStatus, ServerMsg};

use super::catalog::random_weapon_name;
use super::combat::HitHooks;
use super::geometry::{clamp_to_arena, ground_distance, random_arena_point, yaw_towards};
use super::room::{DamageOutcome, Room, WanderGoal};

/// Ticks between forced target re-evaluations
pub const TARGET_REFRESH_TICKS: u64 = 15;
/// Units per second while chasing
pub const CHASE_SPEED: f32 = 3.0;
/// Units per second while wandering
pub const WANDER_SPEED: f32 = 2.0;
/// Ground distance at which a bot swings
pub const MELEE_RANGE: f32 = 2.0;
/// Fixed bot hit damage
pub const BOT_DAMAGE: f32 = 15.0;
/// Seconds between bot swings
pub const ATTACK_COOLDOWN: f32 = 0.9;
/// Lifetime of a wander goal, in ticks
pub const WANDER_TTL_TICKS: Range<u32> = 30..60;
/// Chance per tick that an unarmed bot picks up a weapon
pub const EQUIP_CHANCE: f64 = 0.05;

const ARRIVE_EPSILON: f32 = 0.01;
const MOVING_THRESHOLD: f32 = 0.05;

pub const ANIM_WALK: &str = "Walk";
pub const ANIM_IDLE: &str = "Idle";
pub const ANIM_ATTACK: &str = "SwordSlash";

/// Something a bot did this step, in the order it happened
#[derive(Debug, Clone, PartialEq)]
pub enum BotAction {
    /// Position/animation broadcast
    Update(ServerMsg),
    /// A swing at the locked target; `outcome` is None if the hit was not applied
    Attacked {
        bot_id: Uuid,
        target_id: Uuid,
        outcome: Option<DamageOutcome>,
    },
}

/// Run one bot step of `dt` seconds over every living bot in a playing room
pub fn advance<R: Rng + ?Sized>(room: &mut Room, dt: f32, rng: &mut R) -> Vec<BotAction> {
    let mut actions = Vec::new();
    if room.status != RoomStatus::Playing {
        return actions;
    }

    for bot_id in room.bot_ids() {
        step_bot(room, bot_id, dt, rng, &mut actions);
    }

    actions
}

fn step_bot<R: Rng + ?Sized>(
    room: &mut Room,
    bot_id: Uuid,
    dt: f32,
    rng: &mut R,
    actions: &mut Vec<BotAction>,
) {
    let Some(idx) = room.index_of(&bot_id) else {
        return;
    };
    if !room.players[idx].is_alive() {
        return;
    }

    // Targeting
    let (tick, current) = match room.players[idx].bot.as_mut() {
        Some(brain) => {
            brain.tick += 1;
            (brain.tick, brain.target_id)
        }
        None => return,
    };
    let still_valid = current
        .and_then(|id| room.player(&id))
        .is_some_and(|p| p.is_alive());
    let target_id = if !still_valid || tick % TARGET_REFRESH_TICKS == 0 {
        nearest_target(room, idx)
    } else {
        current
    };
    let target_pos = target_id.and_then(|id| room.player(&id)).map(|p| p.position);

    let bot = &mut room.players[idx];
    let Some(brain) = bot.bot.as_mut() else {
        return;
    };
    brain.target_id = target_id;

    // Destination
    let goal = match target_pos {
        Some(pos) => pos,
        None => {
            let wander = match brain.wander {
                Some(mut w) if w.ttl > 0 => {
                    w.ttl -= 1;
                    w
                }
                _ => WanderGoal {
                    point: random_arena_point(rng, 0.0),
                    ttl: rng.gen_range(WANDER_TTL_TICKS),
                },
            };
            brain.wander = Some(wander);
            wander.point
        }
    };

    // Movement
    let dx = goal.x - bot.position.x;
    let dz = goal.z - bot.position.z;
    let len = (dx * dx + dz * dz).sqrt();
    let speed = if target_pos.is_some() {
        CHASE_SPEED
    } else {
        WANDER_SPEED
    };
    if len > ARRIVE_EPSILON {
        let step = len.min(speed * dt);
        bot.position.x += dx / len * step;
        bot.position.z += dz / len * step;
        bot.yaw = yaw_towards(dx, dz);
    }
    bot.position = clamp_to_arena(Vec3::new(bot.position.x, 0.0, bot.position.z));

    if bot.equipped_weapon.is_none() && rng.gen_bool(EQUIP_CHANCE) {
        bot.equipped_weapon = random_weapon_name(rng);
    }

    let animation = if len > MOVING_THRESHOLD {
        ANIM_WALK
    } else {
        ANIM_IDLE
    };
    actions.push(BotAction::Update(ServerMsg::GameUpdate {
        player_id: bot.id,
        position: bot.position.to_array(),
        rotation: bot.rotation(),
        animation: animation.to_string(),
        hp: Some(bot.hp),
        equipped_weapon: bot.equipped_weapon.clone(),
        is_attacking: bot.is_attacking,
    }));

    // Attack
    let Some(brain) = bot.bot.as_mut() else {
        return;
    };
    if brain.attack_cooldown > 0.0 {
        brain.attack_cooldown -= dt;
    }
    let (Some(target_id), Some(target_pos)) = (target_id, target_pos) else {
        return;
    };
    let in_range = ground_distance(bot.position, target_pos) < MELEE_RANGE;
    if !in_range || brain.attack_cooldown > 0.0 {
        return;
    }

    brain.attack_cooldown = ATTACK_COOLDOWN;
    let mut recently_damaged = std::mem::take(&mut brain.recently_damaged);
    bot.is_attacking = true;

    // A bot swing strikes only its locked target
    let mut swing_hits = HashSet::new();
    let outcome = {
        let mut hooks = HitHooks {
            recently_damaged: Some(&mut recently_damaged),
            on_hit: None,
        };
        room.strike(bot_id, &target_id, BOT_DAMAGE, &mut swing_hits, &mut hooks)
    };
    if let Some(brain) = room.players[idx].bot.as_mut() {
        brain.recently_damaged = recently_damaged;
    }
    actions.push(BotAction::Attacked {
        bot_id,
        target_id,
        outcome,
    });
}

/// Nearest living player other than `players[idx]` by ground distance; the
/// earlier roster entry wins ties
fn nearest_target(room: &Room, idx: usize) -> Option<Uuid> {
    let me = &room.players[idx];
    let mut best: Option<(f32, Uuid)> = None;
    for (i, other) in room.players.iter().enumerate() {
        if i == idx || !other.is_alive() {
            continue;
        }
        let d = ground_distance(me.position, other.position);
        if best.map_or(true, |(best_d, _)| d < best_d) {
            best = Some((d, other.id));
        }
    }
    best.map(|(_, id)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::geometry::in_arena;
    use crate::game::room::Player;
    use crate::ws::protocol::{RoomSettings, Visibility};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const DT: f32 = 0.1;

    fn room_with(players: Vec<Player>) -> Room {
        let host = players[0].id;
        let mut room = Room::new(
            "botroom".into(),
            host,
            RoomSettings {
                name: "bots".into(),
                map: "forest".into(),
                max_players: 8,
                visibility: Visibility::Public,
                round_time: 60,
                nickname: "host".into(),
                character: "Elf".into(),
            },
        );
        room.players = players;
        room.begin_round(Vec::new());
        room
    }

    fn bot_at(rng: &mut ChaCha8Rng, x: f32, z: f32) -> Player {
        let mut bot = Player::random_bot(rng);
        bot.position = Vec3::new(x, 0.0, z);
        bot
    }

    fn human_at(x: f32, z: f32) -> Player {
        let mut p = Player::human(Uuid::new_v4(), "human".into(), "Elf".into());
        p.position = Vec3::new(x, 0.0, z);
        p
    }

    fn attacks(actions: &[BotAction]) -> Vec<&BotAction> {
        actions
            .iter()
            .filter(|a| matches!(a, BotAction::Attacked { .. }))
            .collect()
    }

    #[test]
    fn test_acquires_nearest_with_roster_tiebreak() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let first = human_at(5.0, 0.0);
        let second = human_at(-5.0, 0.0);
        let far = human_at(0.0, 20.0);
        let bot = bot_at(&mut rng, 0.0, 0.0);
        let bot_id = bot.id;
        let first_id = first.id;
        let mut room = room_with(vec![first, second, far, bot]);

        advance(&mut room, DT, &mut rng);

        let brain = room.player(&bot_id).unwrap().bot.as_ref().unwrap();
        assert_eq!(brain.target_id, Some(first_id));
    }

    #[test]
    fn test_chases_at_chase_speed() {
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let target = human_at(10.0, 0.0);
        let bot = bot_at(&mut rng, 0.0, 0.0);
        let bot_id = bot.id;
        let mut room = room_with(vec![target, bot]);

        let actions = advance(&mut room, DT, &mut rng);

        let bot = room.player(&bot_id).unwrap();
        assert!((bot.position.x - CHASE_SPEED * DT).abs() < 1e-5);
        assert!((bot.yaw - std::f32::consts::FRAC_PI_2).abs() < 1e-5);
        match &actions[0] {
            BotAction::Update(ServerMsg::GameUpdate { animation, .. }) => {
                assert_eq!(animation, ANIM_WALK)
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_lone_bot_wanders_in_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let host = human_at(0.0, 0.0);
        let host_id = host.id;
        let bot = bot_at(&mut rng, 38.9, -38.9);
        let bot_id = bot.id;
        let mut room = room_with(vec![host, bot]);
        room.player_mut(&host_id).unwrap().hp = 0;

        let mut last = room.player(&bot_id).unwrap().position;
        for _ in 0..300 {
            advance(&mut room, DT, &mut rng);
            let bot = room.player(&bot_id).unwrap();
            assert!(in_arena(bot.position));
            assert!(ground_distance(last, bot.position) <= WANDER_SPEED * DT + 1e-4);
            assert!(bot.bot.as_ref().unwrap().target_id.is_none());
            last = bot.position;
        }
    }

    #[test]
    fn test_attacks_in_range_with_cooldown() {
        let mut rng = ChaCha8Rng::seed_from_u64(14);
        let target = human_at(1.0, 0.0);
        let target_id = target.id;
        let bot = bot_at(&mut rng, 0.0, 0.0);
        let bot_id = bot.id;
        let mut room = room_with(vec![target, bot]);

        let first = advance(&mut room, DT, &mut rng);
        assert_eq!(attacks(&first).len(), 1);
        assert_eq!(room.player(&target_id).unwrap().hp, 85);
        assert!(room.player(&bot_id).unwrap().is_attacking);
        let brain = room.player(&bot_id).unwrap().bot.as_ref().unwrap();
        assert!(brain.recently_damaged.contains(&target_id));

        let second = advance(&mut room, DT, &mut rng);
        assert!(attacks(&second).is_empty());

        let mut swings = 1;
        for _ in 0..10 {
            swings += attacks(&advance(&mut room, DT, &mut rng)).len();
        }
        assert_eq!(swings, 2);
    }

    #[test]
    fn test_bot_kills_bot() {
        let mut rng = ChaCha8Rng::seed_from_u64(15);
        let host = human_at(30.0, 30.0);
        let killer = bot_at(&mut rng, 0.0, 0.0);
        let victim = bot_at(&mut rng, 0.5, 0.0);
        let (killer_id, victim_id) = (killer.id, victim.id);
        let mut room = room_with(vec![host, killer, victim]);
        room.player_mut(&victim_id).unwrap().hp = 10;

        let actions = advance(&mut room, DT, &mut rng);

        let kill = actions.iter().find_map(|a| match a {
            BotAction::Attacked {
                bot_id,
                outcome: Some(DamageOutcome { kill: Some(kill), .. }),
                ..
            } if *bot_id == killer_id => Some(kill.clone()),
            _ => None,
        });
        let kill = kill.expect("killer bot should land the lethal hit");
        assert!(kill.victim_is_bot);
        assert_eq!(room.player(&killer_id).unwrap().kills, 1);
        assert_eq!(room.player(&victim_id).unwrap().deaths, 1);
        assert_eq!(room.player(&victim_id).unwrap().hp, 0);
    }

    #[test]
    fn test_dead_bots_and_idle_rooms_do_nothing() {
        let mut rng = ChaCha8Rng::seed_from_u64(16);
        let host = human_at(0.0, 0.0);
        let bot = bot_at(&mut rng, 5.0, 5.0);
        let bot_id = bot.id;
        let mut room = room_with(vec![host, bot]);

        room.player_mut(&bot_id).unwrap().hp = 0;
        assert!(advance(&mut room, DT, &mut rng).is_empty());

        room.player_mut(&bot_id).unwrap().hp = 100;
        room.status = RoomStatus::Ended;
        assert!(advance(&mut room, DT, &mut rng).is_empty());
    }
}
