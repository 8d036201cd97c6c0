//! Command line and layered file/env configuration.

use std::path::PathBuf;

use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use pairlink_server::ServerConfig;
use serde::{Deserialize, Serialize};

/// Two-player lobby broker.
#[derive(Parser, Debug, Clone)]
#[command(name = "pairlink", version, about = "Two-player lobby broker")]
pub struct Cli {
    /// Path to TOML config file.
    #[arg(long, env = "PAIRLINK_CONFIG", default_value = "./pairlink.toml")]
    pub config: PathBuf,

    /// Host to bind.
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    pub port: Option<u16>,

    /// Maximum concurrent `WebSocket` connections.
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Structured JSON logs.
    #[arg(long)]
    pub json_logs: bool,

    /// Print a commented TOML config template and exit.
    #[arg(long)]
    pub generate_config: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `pairlink_server=debug`.
    pub level: String,
    /// JSON output instead of pretty text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// `[server]` section.
    pub server: ServerConfig,
    /// `[logging]` section.
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load with precedence: defaults < TOML file < `PAIRLINK_*` env < CLI flags.
    ///
    /// Nested keys use a double underscore, e.g. `PAIRLINK_SERVER__PORT`.
    pub fn load(cli: &Cli) -> Result<Self, figment::Error> {
        Self::figment(cli).extract()
    }

    fn figment(cli: &Cli) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("PAIRLINK_").split("__"));

        if let Some(host) = &cli.host {
            figment = figment.merge(Serialized::default("server.host", host));
        }
        if let Some(port) = cli.port {
            figment = figment.merge(Serialized::default("server.port", port));
        }
        if let Some(max) = cli.max_connections {
            figment = figment.merge(Serialized::default("server.max_connections", max));
        }
        if let Some(level) = &cli.log_level {
            figment = figment.merge(Serialized::default("logging.level", level));
        }
        if cli.json_logs {
            figment = figment.merge(Serialized::default("logging.json", true));
        }
        figment
    }
}

/// Commented TOML template with every key at its default.
pub fn generate_config_template() -> String {
    let server = ServerConfig::default();
    let logging = LoggingConfig::default();
    format!(
        r#"# pairlink configuration
# Place this file at ./pairlink.toml or pass --config <path>.
# Every key can be overridden with PAIRLINK_<SECTION>__<KEY>, e.g.
# PAIRLINK_SERVER__PORT=9000, or with the matching CLI flag.

[server]
# host = "{host}"
# port = {port}

# Upgrades beyond this many open connections get 503.
# max_connections = {max_connections}
# max_message_size = {max_message_size}

# Frames queued per session before the backpressure policy applies.
# outbound_queue_capacity = {queue}
# "disconnect" drops the slow client, "drop_newest" drops the frame only.
# backpressure = "disconnect"

# heartbeat_interval_secs = {hb_interval}
# heartbeat_timeout_secs = {hb_timeout}

# Lobbies with no joins or departures for this long are closed.
# lobby_idle_timeout_secs = {idle}
# reap_interval_secs = {reap}

[logging]
# RUST_LOG takes precedence when set.
# level = "{level}"
# json = {json}
"#,
        host = server.host,
        port = server.port,
        max_connections = server.max_connections,
        max_message_size = server.max_message_size,
        queue = server.outbound_queue_capacity,
        hb_interval = server.heartbeat_interval_secs,
        hb_timeout = server.heartbeat_timeout_secs,
        idle = server.lobby_idle_timeout_secs,
        reap = server.reap_interval_secs,
        level = logging.level,
        json = logging.json,
    )
}
