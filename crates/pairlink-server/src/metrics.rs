//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Call once at startup, before anything is recorded. Metrics recorded
/// without an installed recorder are discarded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// `WebSocket` connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// `WebSocket` connections rejected at the connection limit (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Open `WebSocket` connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Lobbies created (counter).
pub const LOBBIES_CREATED_TOTAL: &str = "lobbies_created_total";
/// Successful lobby joins (counter).
pub const LOBBY_JOINS_TOTAL: &str = "lobby_joins_total";
/// Failed lobby actions (counter, labels: reason).
pub const LOBBY_JOIN_FAILURES_TOTAL: &str = "lobby_join_failures_total";
/// Inbound frames discarded as undecodable (counter).
pub const MALFORMED_FRAMES_TOTAL: &str = "malformed_frames_total";
/// Outbound frames dropped on a full queue (counter).
pub const OUTBOUND_DROPS_TOTAL: &str = "outbound_drops_total";
/// Lobbies closed by the idle reaper (counter).
pub const LOBBIES_REAPED_TOTAL: &str = "lobbies_reaped_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_CONNECTIONS_REJECTED_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            LOBBIES_CREATED_TOTAL,
            LOBBY_JOINS_TOTAL,
            LOBBY_JOIN_FAILURES_TOTAL,
            MALFORMED_FRAMES_TOTAL,
            OUTBOUND_DROPS_TOTAL,
            LOBBIES_REAPED_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
