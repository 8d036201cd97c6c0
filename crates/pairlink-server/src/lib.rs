//! # pairlink-server
//!
//! Axum `WebSocket` lobby broker.
//!
//! - `registry`: sessions, capacity-2 lobbies, create/join/remove under lock
//! - `dispatch`: decoded message → registry operation → deliveries
//! - `websocket`: per-connection reader/writer loops, heartbeat, frame handling
//! - `reaper`: periodic teardown of idle lobbies
//! - HTTP endpoints: `/ws`, `/ping` status, `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod metrics;
pub mod reaper;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod status;
pub mod websocket;

pub use config::{BackpressurePolicy, ServerConfig};
pub use server::{LobbyServer, ServerHandle};
