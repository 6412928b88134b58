//! Position math shared by every hit test and by bot steering

use glam::Vec3;
use rand::Rng;

/// The arena is a square of +/- this many units on x and z
pub const ARENA_HALF_EXTENT: f32 = 39.0;

/// Slack applied at inclusive geometric boundaries
pub const BOUNDARY_EPSILON: f32 = 1e-4;

/// Project onto the ground plane
pub fn ground(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Straight-line distance
pub fn distance(a: Vec3, b: Vec3) -> f32 {
    a.distance(b)
}

/// Distance ignoring height
pub fn ground_distance(a: Vec3, b: Vec3) -> f32 {
    ground(a).distance(ground(b))
}

/// Unit vector, or zero when `v` has no usable length
pub fn direction_or_zero(v: Vec3) -> Vec3 {
    v.normalize_or_zero()
}

/// Angle between two vectors in radians, clamped against acos domain errors.
/// Zero-length inputs yield 0.
pub fn angle_between(a: Vec3, b: Vec3) -> f32 {
    let (a, b) = (a.normalize_or_zero(), b.normalize_or_zero());
    if a == Vec3::ZERO || b == Vec3::ZERO {
        return 0.0;
    }
    a.dot(b).clamp(-1.0, 1.0).acos()
}

/// Yaw that faces along (dx, dz), matching the client's model orientation
pub fn yaw_towards(dx: f32, dz: f32) -> f32 {
    dx.atan2(dz)
}

/// Keep a point inside the arena square; height is left alone
pub fn clamp_to_arena(p: Vec3) -> Vec3 {
    Vec3::new(
        p.x.clamp(-ARENA_HALF_EXTENT, ARENA_HALF_EXTENT),
        p.y,
        p.z.clamp(-ARENA_HALF_EXTENT, ARENA_HALF_EXTENT),
    )
}

/// Is the point on or inside the arena square
pub fn in_arena(p: Vec3) -> bool {
    p.x.abs() <= ARENA_HALF_EXTENT && p.z.abs() <= ARENA_HALF_EXTENT
}

/// Uniform ground point inside the arena at height `y`
pub fn random_arena_point<R: Rng + ?Sized>(rng: &mut R, y: f32) -> Vec3 {
    Vec3::new(
        rng.gen_range(-ARENA_HALF_EXTENT..=ARENA_HALF_EXTENT),
        y,
        rng.gen_range(-ARENA_HALF_EXTENT..=ARENA_HALF_EXTENT),
    )
}
