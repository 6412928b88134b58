//! Room lobby: registry, timers and the task that drives them

pub mod registry;
pub mod scheduler;
pub mod service;

pub use registry::{Outbound, RoomError, RoomRegistry};
pub use scheduler::{ManualScheduler, Scheduler, TimerEvent, TimerHandle, TokioScheduler};
pub use service::{Lobby, LobbyHandle, LobbyStats};
