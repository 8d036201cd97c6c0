//! # pairlink-core
//!
//! Shared types for the pairlink two-player lobby broker.
//!
//! - [`ids`]: branded `SessionId` and the short human-shareable `LobbyCode`
//! - [`protocol`]: the `{type, payload}` envelope and its closed sets of
//!   inbound and outbound variants
//! - [`errors`]: protocol decode errors and lobby domain errors

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod protocol;

pub use errors::{LobbyError, ProtocolError};
pub use ids::{LobbyCode, SessionId};
pub use protocol::{ClientMessage, LobbyView, MessageType, PlayerProfile, PlayerView, ServerMessage};
