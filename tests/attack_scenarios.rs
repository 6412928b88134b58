//! Attack actors resolved against real room players

use std::collections::HashSet;
use std::f32::consts::FRAC_PI_2;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arena_server::game::attack::AttackActor;
use arena_server::game::combat::{AttackKind, Effect, HitHooks, HitKind, WeaponStats};
use arena_server::game::room::{Player, MAX_HP};
use arena_server::game::DebugVisual;
use glam::Vec3;
use uuid::Uuid;

fn player_at(name: &str, x: f32, z: f32) -> Player {
    let mut p = Player::human(Uuid::new_v4(), name.into(), "Knight_Male".into());
    p.position = Vec3::new(x, 0.0, z);
    p
}

#[test]
fn sword_swing_hits_everyone_in_front_once() {
    let attacker = player_at("attacker", 0.0, 0.0);
    let mut players = vec![
        attacker.clone(),
        player_at("front", 0.0, 1.5),
        player_at("flank", 1.0, 1.0),
        player_at("behind", 0.0, -1.5),
    ];

    let sword = WeaponStats::melee(20.0, 2.0, FRAC_PI_2);
    let mut swing = AttackActor::new(
        attacker.id,
        AttackKind::Sector,
        attacker.position,
        Vec3::Z,
        sword,
    );

    let mut recently_damaged = HashSet::new();
    let mut hooks = HitHooks {
        recently_damaged: Some(&mut recently_damaged),
        on_hit: None,
    };

    let mut total_hits = 0;
    while !swing.is_destroyed() {
        total_hits += swing.tick(0.05, &mut players, &mut hooks).hits.len();
    }
    drop(hooks);

    assert_eq!(total_hits, 2);
    assert_eq!(players[1].hp, MAX_HP - 20);
    assert_eq!(players[2].hp, MAX_HP - 20);
    assert_eq!(players[3].hp, MAX_HP);
    assert_eq!(players[0].hp, MAX_HP);
    assert_eq!(recently_damaged.len(), 2);
}

#[test]
fn fireball_explodes_on_first_contact() {
    let attacker = player_at("mage", 0.0, 0.0);
    let mut players = vec![
        attacker.clone(),
        player_at("target", 0.0, 5.0),
        player_at("bystander", 1.0, 5.0),
        player_at("far", 0.0, 12.0),
    ];

    let fireball = WeaponStats::ranged(40.0, 1.0, 20.0, 30.0, Effect::Explosion);
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();
    let mut projectile = AttackActor::new(
        attacker.id,
        AttackKind::Circle,
        attacker.position,
        Vec3::Z,
        fireball,
    )
    .with_debug_visual(DebugVisual::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    let mut hits = Vec::new();
    let mut hooks = HitHooks::none();
    for _ in 0..20 {
        let report = projectile.tick(0.05, &mut players, &mut hooks);
        hits.extend(report.hits);
        if report.destroyed {
            break;
        }
    }

    assert!(projectile.is_destroyed());
    assert_eq!(released.load(Ordering::SeqCst), 1);

    let direct: Vec<_> = hits.iter().filter(|h| h.kind == HitKind::Direct).collect();
    assert_eq!(direct.len(), 1);
    assert_eq!(players[3].hp, MAX_HP);
    assert_eq!(players[1].hp, MAX_HP - 40);
    // Splash is half damage and reaches everyone within twice the radius
    let splash: Vec<_> = hits.iter().filter(|h| h.kind == HitKind::Splash).collect();
    assert_eq!(splash.len(), 1);
    assert_eq!(splash[0].target_id, players[2].id);
    assert_eq!(players[2].hp, MAX_HP - 20);
    assert_eq!(players[0].hp, MAX_HP);
}
