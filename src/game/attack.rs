//! Attack actors - one swing or one projectile flight each

use std::collections::HashSet;

use glam::Vec3;
use uuid::Uuid;

use super::combat::{
    AttackKind, AttackShape, Damageable, Hit, HitHooks, HitKind, HitResolver, Strike, TargetId,
    WeaponStats,
};
use super::geometry::direction_or_zero;

/// How long a sweep keeps testing for targets (seconds)
pub const SWEEP_LIFETIME: f32 = 0.2;

/// A visualization tied to one attack. Released exactly once, on destroy or drop.
pub struct DebugVisual {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl DebugVisual {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }
}

impl Drop for DebugVisual {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for DebugVisual {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugVisual")
            .field("released", &self.is_released())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackState {
    Active,
    Destroyed,
}

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub hits: Vec<Hit>,
    pub destroyed: bool,
}

/// One ongoing attack
#[derive(Debug)]
pub struct AttackActor {
    pub id: Uuid,
    attacker_id: TargetId,
    kind: AttackKind,
    position: Vec3,
    direction: Vec3,
    weapon: WeaponStats,
    traveled: f32,
    lifetime: f32,
    hit_targets: HashSet<TargetId>,
    state: AttackState,
    debug: Option<DebugVisual>,
}

impl AttackActor {
    pub fn new(
        attacker_id: TargetId,
        kind: AttackKind,
        origin: Vec3,
        direction: Vec3,
        weapon: WeaponStats,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            attacker_id,
            kind,
            position: origin,
            direction: direction_or_zero(direction),
            weapon,
            traveled: 0.0,
            lifetime: SWEEP_LIFETIME,
            hit_targets: HashSet::new(),
            state: AttackState::Active,
            debug: None,
        }
    }

    /// Attach a visualization; it is released when the attack is destroyed
    pub fn with_debug_visual(mut self, visual: DebugVisual) -> Self {
        self.debug = Some(visual);
        self
    }

    pub fn attacker_id(&self) -> TargetId {
        self.attacker_id
    }

    pub fn kind(&self) -> AttackKind {
        self.kind
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn traveled(&self) -> f32 {
        self.traveled
    }

    pub fn lifetime(&self) -> f32 {
        self.lifetime
    }

    pub fn state(&self) -> AttackState {
        self.state
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == AttackState::Destroyed
    }

    pub fn has_hit(&self, target_id: &TargetId) -> bool {
        self.hit_targets.contains(target_id)
    }

    /// Current hit volume
    pub fn shape(&self) -> AttackShape {
        if self.kind.is_sweep() {
            AttackShape::Sector {
                origin: self.position,
                facing: self.direction,
                radius: self.weapon.radius,
                sector_angle: self.weapon.sector_angle,
            }
        } else {
            AttackShape::Circle {
                center: self.position,
                radius: self.weapon.radius,
            }
        }
    }

    /// Advance by `dt` seconds against `targets`
    pub fn tick<T: Damageable>(
        &mut self,
        dt: f32,
        targets: &mut [T],
        hooks: &mut HitHooks<'_>,
    ) -> TickReport {
        if self.is_destroyed() {
            return TickReport {
                hits: Vec::new(),
                destroyed: true,
            };
        }

        let hits = if self.kind.is_sweep() {
            self.tick_sweep(dt, targets, hooks)
        } else {
            self.tick_projectile(dt, targets, hooks)
        };

        TickReport {
            hits,
            destroyed: self.is_destroyed(),
        }
    }

    fn tick_sweep<T: Damageable>(
        &mut self,
        dt: f32,
        targets: &mut [T],
        hooks: &mut HitHooks<'_>,
    ) -> Vec<Hit> {
        let shape = self.shape();
        let struck = HitResolver::struck(&shape, self.attacker_id, &self.hit_targets, targets);

        // Sweeps hit everyone they pass over once; only the lifetime ends them
        let hits = struck
            .into_iter()
            .map(|idx| {
                HitResolver::apply_hit(
                    &mut targets[idx],
                    self.weapon.damage,
                    HitKind::Direct,
                    &mut self.hit_targets,
                    hooks,
                )
            })
            .collect();

        self.lifetime -= dt;
        if self.lifetime <= 0.0 {
            self.destroy();
        }

        hits
    }

    fn tick_projectile<T: Damageable>(
        &mut self,
        dt: f32,
        targets: &mut [T],
        hooks: &mut HitHooks<'_>,
    ) -> Vec<Hit> {
        let step = self.weapon.speed * dt;
        self.position += self.direction * step;
        self.traveled += step;

        let shape = self.shape();
        let struck = HitResolver::struck(&shape, self.attacker_id, &self.hit_targets, targets);

        let mut hits = Vec::new();
        for idx in struck {
            // Explosion splash may already have claimed this one
            if self.hit_targets.contains(&targets[idx].target_id()) {
                continue;
            }
            let outcome = HitResolver::resolve_effect(
                Strike {
                    attacker_id: self.attacker_id,
                    weapon: &self.weapon,
                    center: self.position,
                    already_hit: &mut self.hit_targets,
                },
                idx,
                targets,
                hooks,
            );
            hits.extend(outcome.hits);
            if outcome.terminal {
                self.destroy();
                return hits;
            }
        }

        // A projectile that cannot move would never reach its range
        let speed = self.weapon.speed;
        let stalled = speed.is_nan() || speed <= 0.0 || self.direction == Vec3::ZERO;
        if stalled || self.traveled >= self.weapon.range {
            self.destroy();
        }

        hits
    }

    /// Idempotent; releases the debug visual on the first call
    pub fn destroy(&mut self) {
        if self.state == AttackState::Destroyed {
            return;
        }
        if let Some(mut visual) = self.debug.take() {
            visual.release();
        }
        self.state = AttackState::Destroyed;
    }
}
