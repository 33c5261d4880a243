//! WebSocket infrastructure for real-time collaboration.
//!
//! Provides the broadcast hub, heartbeat monitoring, and the HTTP upgrade
//! handler used by Axum routes.

mod handler;
mod heartbeat;
pub mod hub;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use hub::BroadcastHub;
