//! `WebSocket` connection lifecycle, heartbeat and inbound frame handling.

pub mod handler;
pub mod heartbeat;
pub mod session;
