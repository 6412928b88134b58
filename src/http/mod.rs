//! HTTP surface: health, room browser, WebSocket upgrade and static client

pub mod routes;

pub use routes::{build_router, AppError};
