//! `/ping` liveness endpoint.

use serde::Serialize;

use crate::registry::Registry;

/// Liveness body with live counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Registered sessions.
    pub online_players_count: usize,
    /// Active lobbies.
    pub lobbies_count: usize,
    /// Always `"alive"`.
    pub status: &'static str,
}

/// Snapshot the registry counters.
pub fn status(registry: &Registry) -> StatusResponse {
    StatusResponse {
        online_players_count: registry.session_count(),
        lobbies_count: registry.lobby_count(),
        status: "alive",
    }
}
