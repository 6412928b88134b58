//! Arena Server - authoritative room server for a multiplayer combat arena
//!
//! Rooms, rosters, bots and round timers all live on a single lobby task.
//! Combat resolution for attack actors is in [`game::combat`] and
//! [`game::attack`].

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod lobby;
pub mod util;
pub mod ws;
