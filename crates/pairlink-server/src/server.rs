//! `LobbyServer`: Axum HTTP + `WebSocket` server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::metrics::{self as server_metrics, WS_CONNECTIONS_REJECTED_TOTAL};
use crate::reaper::spawn_lobby_reaper;
use crate::registry::{Registry, RegistryConfig};
use crate::shutdown::ShutdownCoordinator;
use crate::status::{self, StatusResponse};
use crate::websocket::session::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session and lobby directory.
    pub registry: Arc<Registry>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: ShutdownCoordinator,
    /// Prometheus handle for `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Open `WebSocket` connections.
    pub connections: Arc<AtomicUsize>,
}

/// The lobby broker server.
pub struct LobbyServer {
    config: Arc<ServerConfig>,
    registry: Arc<Registry>,
    shutdown: ShutdownCoordinator,
    metrics: Option<PrometheusHandle>,
    connections: Arc<AtomicUsize>,
}

impl LobbyServer {
    /// Create a server with an empty registry.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(Registry::new(RegistryConfig::from(&config)));
        Self::with_registry(config, registry)
    }

    /// Create a server around an existing registry.
    pub fn with_registry(config: ServerConfig, registry: Arc<Registry>) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            shutdown: ShutdownCoordinator::new(),
            metrics: None,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
            metrics: self.metrics.clone(),
            connections: self.connections.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/ping", get(ping_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind, then serve and run the lobby reaper in the background.
    ///
    /// Both tasks stop when [`ShutdownCoordinator::shutdown`] is called.
    pub async fn listen(&self) -> std::io::Result<ServerHandle> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();

        let token = self.shutdown.token();
        let server = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(err) = serve.await {
                error!(error = %err, "server error");
            }
        });

        let reaper = spawn_lobby_reaper(
            self.registry.clone(),
            self.config.reap_interval(),
            self.config.lobby_idle_timeout(),
            self.shutdown.token(),
        );

        info!(%addr, "pairlink server listening");
        Ok(ServerHandle {
            addr,
            tasks: vec![server, reaper],
        })
    }

    /// Session and lobby directory.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open `WebSocket` connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }
}

/// Handle returned by [`LobbyServer::listen`].
#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bound port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Background tasks, for [`ShutdownCoordinator::graceful_shutdown`].
    pub fn into_tasks(self) -> Vec<JoinHandle<()>> {
        self.tasks
    }
}

/// One slot of the connection limit, released on drop.
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(counter: &Arc<AtomicUsize>, limit: usize) -> Option<Self> {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .ok()
            .map(|_| Self(counter.clone()))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// GET /ws
async fn ws_handler(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let Some(slot) = ConnectionSlot::acquire(&state.connections, state.config.max_connections)
    else {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(
            limit = state.config.max_connections,
            "connection limit reached, rejecting upgrade"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let cancel = state.shutdown.child_token();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let _slot = slot;
            run_ws_session(socket, state.registry, state.config, cancel).await;
        })
        .into_response()
}

/// GET /ping
async fn ping_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(status::status(&state.registry))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => server_metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
