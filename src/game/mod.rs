//! Game simulation modules

pub mod attack;
pub mod bot;
pub mod catalog;
pub mod combat;
pub mod geometry;
pub mod room;

pub use attack::{AttackActor, DebugVisual};
pub use combat::{Damageable, Effect, HitResolver, WeaponStats};
pub use room::{Player, Room, RoomId};
