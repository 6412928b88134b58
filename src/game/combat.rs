//! Hit resolution - weapon geometry, effects, damage application
//!
//! Everything here is stateless: the caller owns the attack (see
//! [`super::attack::AttackActor`]) and the targets, and hands both in.

use std::collections::HashSet;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::geometry::{angle_between, distance, ground, BOUNDARY_EPSILON};

/// Identity of anything that can be hit
pub type TargetId = Uuid;

/// Collision radius used when a target does not report its own extents
pub const DEFAULT_COLLISION_RADIUS: f32 = 0.7;

/// Splash radius relative to the projectile radius
pub const EXPLOSION_RADIUS_FACTOR: f32 = 2.0;

/// Splash damage relative to weapon damage
pub const EXPLOSION_DAMAGE_FACTOR: f32 = 0.5;

/// Anything an attack can damage
pub trait Damageable {
    fn target_id(&self) -> TargetId;

    fn position(&self) -> Vec3;

    /// Dead or otherwise invulnerable targets are skipped entirely
    fn can_take_damage(&self) -> bool;

    fn take_damage(&mut self, amount: f32);

    /// Bounding-sphere radius for projectile tests
    fn collision_radius(&self) -> f32 {
        DEFAULT_COLLISION_RADIUS
    }
}

/// Post-hit behavior of a weapon
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// Single target, attack ends on hit
    #[default]
    None,
    /// Keeps going and may hit further targets
    Piercing,
    /// Splash damage around the first target, then ends
    Explosion,
}

/// Shape of an attack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackKind {
    /// Ground-plane pie slice in front of the attacker
    Sector,
    /// Jump attack; same geometry as a sector
    Aerial,
    /// Traveling sphere
    Circle,
}

impl AttackKind {
    pub fn is_sweep(self) -> bool {
        matches!(self, AttackKind::Sector | AttackKind::Aerial)
    }
}

/// Weapon stats relevant to hit resolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeaponStats {
    /// Damage per hit
    pub damage: f32,
    /// Max projectile travel distance
    pub range: f32,
    /// Sweep reach, or projectile sphere radius
    pub radius: f32,
    /// Full opening angle of a sweep (radians)
    pub sector_angle: f32,
    /// Projectile speed (units per second)
    pub speed: f32,
    pub effect: Effect,
}

impl Default for WeaponStats {
    fn default() -> Self {
        Self {
            damage: 10.0,
            range: 20.0,
            radius: 0.3,
            sector_angle: std::f32::consts::FRAC_PI_2,
            speed: 20.0,
            effect: Effect::None,
        }
    }
}

impl WeaponStats {
    /// A close-range swing
    pub fn melee(damage: f32, reach: f32, sector_angle: f32) -> Self {
        Self {
            damage,
            radius: reach,
            sector_angle,
            ..Self::default()
        }
    }

    /// A thrown or fired projectile
    pub fn ranged(damage: f32, radius: f32, speed: f32, range: f32, effect: Effect) -> Self {
        Self {
            damage,
            range,
            radius,
            speed,
            effect,
            ..Self::default()
        }
    }
}

/// Geometry an attack currently occupies
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttackShape {
    Sector {
        origin: Vec3,
        facing: Vec3,
        radius: f32,
        sector_angle: f32,
    },
    Circle {
        center: Vec3,
        radius: f32,
    },
}

impl AttackShape {
    pub fn contains(&self, target_pos: Vec3, target_radius: f32) -> bool {
        match *self {
            AttackShape::Sector {
                origin,
                facing,
                radius,
                sector_angle,
            } => HitResolver::in_sector(origin, facing, radius, sector_angle, target_pos),
            AttackShape::Circle { center, radius } => {
                HitResolver::in_circle(center, radius, target_pos, target_radius)
            }
        }
    }
}

/// Collaborators notified on every confirmed hit. Both are owned by the caller.
#[derive(Default)]
pub struct HitHooks<'a> {
    /// The attacker's "recently damaged" tracking set
    pub recently_damaged: Option<&'a mut HashSet<TargetId>>,
    /// Optional hit callback (target, damage)
    pub on_hit: Option<&'a mut dyn FnMut(TargetId, f32)>,
}

impl<'a> HitHooks<'a> {
    pub fn none() -> Self {
        Self::default()
    }

    fn notify(&mut self, target_id: TargetId, damage: f32) {
        if let Some(set) = self.recently_damaged.as_deref_mut() {
            set.insert(target_id);
        }
        if let Some(cb) = self.on_hit.as_deref_mut() {
            cb(target_id, damage);
        }
    }
}

/// Whether a hit came from the attack itself or from its splash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    Direct,
    Splash,
}

/// One applied hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub target_id: TargetId,
    pub damage: f32,
    pub kind: HitKind,
}

/// Result of applying a weapon effect after a confirmed hit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectOutcome {
    pub hits: Vec<Hit>,
    /// The attack must be destroyed
    pub terminal: bool,
}

/// The attack doing the striking, as seen by the resolver
pub struct Strike<'s> {
    pub attacker_id: TargetId,
    pub weapon: &'s WeaponStats,
    /// Where splash damage is centered
    pub center: Vec3,
    /// Targets this attack has already damaged
    pub already_hit: &'s mut HashSet<TargetId>,
}

/// Stateless hit resolution
pub struct HitResolver;

impl HitResolver {
    /// Ground-plane pie slice test, inclusive at both the radius and the half angle
    pub fn in_sector(
        origin: Vec3,
        facing: Vec3,
        radius: f32,
        sector_angle: f32,
        target_pos: Vec3,
    ) -> bool {
        let to_target = ground(target_pos - origin);
        let dist = to_target.length();
        if dist > radius + BOUNDARY_EPSILON {
            return false;
        }
        // Standing on the origin counts as inside
        if dist <= f32::EPSILON {
            return true;
        }
        // A facing with no ground component points nowhere on the plane
        let facing = ground(facing);
        if facing.length() <= f32::EPSILON {
            return false;
        }
        let theta = angle_between(facing, to_target);
        theta <= sector_angle / 2.0 + BOUNDARY_EPSILON
    }

    /// Sphere overlap between a projectile and a target's bounding sphere
    pub fn in_circle(center: Vec3, radius: f32, target_pos: Vec3, target_radius: f32) -> bool {
        distance(center, target_pos) <= radius + target_radius + BOUNDARY_EPSILON
    }

    /// Self, dead and already-hit targets are never eligible
    pub fn is_eligible<T: Damageable + ?Sized>(
        attacker_id: TargetId,
        already_hit: &HashSet<TargetId>,
        target: &T,
    ) -> bool {
        let id = target.target_id();
        id != attacker_id && !already_hit.contains(&id) && target.can_take_damage()
    }

    /// Indices of eligible targets currently inside `shape`, in candidate order
    pub fn struck<T: Damageable>(
        shape: &AttackShape,
        attacker_id: TargetId,
        already_hit: &HashSet<TargetId>,
        targets: &[T],
    ) -> Vec<usize> {
        targets
            .iter()
            .enumerate()
            .filter(|(_, t)| Self::is_eligible(attacker_id, already_hit, *t))
            .filter(|(_, t)| shape.contains(t.position(), t.collision_radius()))
            .map(|(i, _)| i)
            .collect()
    }

    /// Damage one target and record it against the attack and the hooks
    pub fn apply_hit<T: Damageable + ?Sized>(
        target: &mut T,
        damage: f32,
        kind: HitKind,
        already_hit: &mut HashSet<TargetId>,
        hooks: &mut HitHooks<'_>,
    ) -> Hit {
        let target_id = target.target_id();
        target.take_damage(damage);
        already_hit.insert(target_id);
        hooks.notify(target_id, damage);
        Hit {
            target_id,
            damage,
            kind,
        }
    }

    /// Apply the weapon effect for a confirmed hit on `targets[primary]`
    pub fn resolve_effect<T: Damageable>(
        strike: Strike<'_>,
        primary: usize,
        targets: &mut [T],
        hooks: &mut HitHooks<'_>,
    ) -> EffectOutcome {
        let Strike {
            attacker_id,
            weapon,
            center,
            already_hit,
        } = strike;

        let Some(target) = targets.get_mut(primary) else {
            return EffectOutcome::default();
        };

        let mut hits = vec![Self::apply_hit(
            target,
            weapon.damage,
            HitKind::Direct,
            already_hit,
            hooks,
        )];

        let terminal = match weapon.effect {
            Effect::None => true,
            Effect::Piercing => false,
            Effect::Explosion => {
                hits.extend(Self::explode(
                    attacker_id,
                    center,
                    weapon.radius,
                    weapon.damage,
                    targets,
                    already_hit,
                    hooks,
                ));
                true
            }
        };

        EffectOutcome { hits, terminal }
    }

    /// Secondary sweep: half damage to every eligible target within twice the base radius
    pub fn explode<T: Damageable>(
        attacker_id: TargetId,
        center: Vec3,
        base_radius: f32,
        damage: f32,
        targets: &mut [T],
        already_hit: &mut HashSet<TargetId>,
        hooks: &mut HitHooks<'_>,
    ) -> Vec<Hit> {
        let blast_radius = base_radius * EXPLOSION_RADIUS_FACTOR;
        let splash = damage * EXPLOSION_DAMAGE_FACTOR;
        let mut hits = Vec::new();

        for target in targets.iter_mut() {
            if !Self::is_eligible(attacker_id, already_hit, &*target) {
                continue;
            }
            if distance(center, target.position()) <= blast_radius + BOUNDARY_EPSILON {
                hits.push(Self::apply_hit(
                    target,
                    splash,
                    HitKind::Splash,
                    already_hit,
                    hooks,
                ));
            }
        }

        hits
    }
}
