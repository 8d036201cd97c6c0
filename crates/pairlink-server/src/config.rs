//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What to do when a session's outbound queue is full.
///
/// Enqueueing never blocks; the policy only decides the fate of the session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Drop the frame and disconnect the slow client.
    #[default]
    Disconnect,
    /// Drop the frame, count it, keep the client.
    DropNewest,
}

/// Configuration for the lobby server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `8080`, `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent `WebSocket` connections.
    pub max_connections: usize,
    /// Max `WebSocket` message size in bytes.
    pub max_message_size: usize,
    /// Pending frames per session before the backpressure policy applies.
    pub outbound_queue_capacity: usize,
    /// Full-queue policy.
    pub backpressure: BackpressurePolicy,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close the connection after this many seconds without inbound frames.
    pub heartbeat_timeout_secs: u64,
    /// Destroy lobbies idle for longer than this many seconds.
    pub lobby_idle_timeout_secs: u64,
    /// How often the idle-lobby reaper runs, in seconds.
    pub reap_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            max_connections: 1024,
            max_message_size: 64 * 1024,
            outbound_queue_capacity: 256,
            backpressure: BackpressurePolicy::Disconnect,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            lobby_idle_timeout_secs: 30 * 60,
            reap_interval_secs: 60,
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Heartbeat interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Heartbeat timeout.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs.max(1))
    }

    /// Idle lifetime of a lobby.
    pub fn lobby_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.lobby_idle_timeout_secs.max(1))
    }

    /// Reaper tick.
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_and_host() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn default_queue_capacity() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.outbound_queue_capacity, 256);
        assert_eq!(cfg.backpressure, BackpressurePolicy::Disconnect);
    }

    #[test]
    fn default_heartbeat() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(cfg.heartbeat_timeout(), Duration::from_secs(90));
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let cfg = ServerConfig {
            heartbeat_interval_secs: 0,
            reap_interval_secs: 0,
            lobby_idle_timeout_secs: 0,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(1));
        assert_eq!(cfg.reap_interval(), Duration::from_secs(1));
        assert_eq!(cfg.lobby_idle_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: ServerConfig =
            serde_json::from_str(r#"{"port":9000,"backpressure":"drop_newest"}"#).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.backpressure, BackpressurePolicy::DropNewest);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.outbound_queue_capacity, 256);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.port, cfg.port);
        assert_eq!(back.lobby_idle_timeout_secs, cfg.lobby_idle_timeout_secs);
    }
}
