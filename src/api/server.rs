//! HTTP Server implementation
//!
//! This module provides the HTTP server using Axum framework with:
//! - Configurable host/port binding
//! - Graceful shutdown on signals or a hub stop/restart request
//! - Request timeouts
//! - The background schedule ticker
//! - CORS support

use crate::api::handlers::AppState;
use crate::api::middleware::trace_id_middleware;
use crate::api::routes::build_api_routes;
use crate::core::config::ServerConfig;
use crate::core::error::{ErrorResponse, WizardError};
use crate::core::persistence::JsonFilePersistence;
use crate::core::profile_store::ProfileStore;
use crate::core::runner::KometaProcessRunner;
use crate::core::scheduler::InMemoryScheduler;
use crate::core::Config;
use crate::hub::{EventSink, ExecutionControl, HubService, SyncHub};
use axum::{
    error_handling::HandleErrorLayer,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    BoxError, Json, Router,
};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

/// How often the scheduler is polled for due runs
const SCHEDULE_TICK: Duration = Duration::from_secs(60);

/// How long shutdown waits for hub sockets to close
const HUB_DRAIN: Duration = Duration::from_secs(5);

/// Why the server stopped serving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerExit {
    Stop,
    Restart,
}

/// Handle for asking a running server to shut down
#[derive(Clone)]
pub struct ServerControl {
    tx: Arc<watch::Sender<Option<ServerExit>>>,
}

impl ServerControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// The last request wins
    pub fn request(&self, exit: ServerExit) {
        self.tx.send_replace(Some(exit));
    }

    pub fn requested(&self) -> Option<ServerExit> {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ServerExit>> {
        self.tx.subscribe()
    }

    /// Resolves once any exit has been requested
    pub async fn wait(&self) -> ServerExit {
        let mut rx = self.subscribe();
        loop {
            if let Some(exit) = *rx.borrow_and_update() {
                return exit;
            }
            if rx.changed().await.is_err() {
                // sender lives in self, so this only happens during teardown
                return ServerExit::Stop;
            }
        }
    }
}

impl Default for ServerControl {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP API Server
pub struct ApiServer {
    router: Router,
    config: ServerConfig,
    control: ServerControl,
    hub_service: Arc<HubService>,
}

impl ApiServer {
    /// Wire the store, hub and execution slot together and build the router
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let server_config = config.server.clone();

        let hub = Arc::new(SyncHub::new());
        let persistence = Arc::new(JsonFilePersistence::new(config.storage.profiles_dir.clone())?);
        let store = Arc::new(ProfileStore::open(persistence, Some(hub.clone() as Arc<dyn EventSink>)).await?);
        info!(profiles = store.list_all().await.len(), "Profiles loaded");

        let runner = Arc::new(KometaProcessRunner::new(&config.execution));
        let execution = Arc::new(ExecutionControl::new(runner, hub.clone()));
        let control = ServerControl::new();
        let hub_service = Arc::new(HubService::new(
            store,
            hub,
            execution,
            Arc::new(InMemoryScheduler::new()),
            config.storage.clone(),
            config.execution.clone(),
            control.clone(),
        ));

        let router = Self::build_router(AppState::new(hub_service.clone(), config));

        Ok(Self {
            router,
            config: server_config,
            control,
            hub_service,
        })
    }

    /// Build the Axum router with all routes and middleware
    fn build_router(state: AppState) -> Router {
        let timeout = Duration::from_secs(state.config.server.request_timeout);
        let cors = Self::build_cors_layer(&state.config.security.allowed_origins);

        build_api_routes(state).layer(
            ServiceBuilder::new()
                // Add trace ID middleware for request tracking
                .layer(middleware::from_fn(trace_id_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .layer(TimeoutLayer::new(timeout)),
        )
    }

    /// Build CORS layer from allowed origins configuration
    fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
        let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

        if allowed_origins.iter().any(|origin| origin == "*") {
            cors.allow_origin(Any)
        } else {
            let origins: Vec<_> = allowed_origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();
            cors.allow_origin(origins)
        }
    }

    pub fn control(&self) -> ServerControl {
        self.control.clone()
    }

    /// Start the HTTP server and listen for requests
    ///
    /// Returns once a signal arrives or a hub client asks to stop or restart.
    pub async fn serve(self) -> anyhow::Result<ServerExit> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let socket_addr: SocketAddr = addr.parse()?;

        info!(
            host = %self.config.host,
            port = self.config.port,
            request_timeout = self.config.request_timeout,
            "Starting HTTP server"
        );

        let listener = tokio::net::TcpListener::bind(socket_addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener.
    ///
    /// Hub sockets are upgraded connections that axum's graceful shutdown does
    /// not track, so every one of them is closed before this returns. A
    /// restarted server therefore never shares viewers with the old one.
    pub async fn serve_on(self, listener: tokio::net::TcpListener) -> anyhow::Result<ServerExit> {
        info!(addr = %listener.local_addr()?, "HTTP server listening");

        let ticker = tokio::spawn(schedule_loop(self.hub_service.clone()));

        let control = self.control.clone();
        let result = axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal(control))
            .await;

        ticker.abort();
        if self.control.requested().is_none() {
            // serve failed on its own; hub sockets still need the signal
            self.control.request(ServerExit::Stop);
        }
        let hub = self.hub_service.hub();
        if tokio::time::timeout(HUB_DRAIN, hub.wait_idle()).await.is_err() {
            let remaining = hub.connection_count().await;
            warn!(remaining, "Hub connections still open after shutdown");
        }
        self.hub_service.execution().stop().await;
        result?;

        let exit = self.control.requested().unwrap_or(ServerExit::Stop);
        info!(exit = ?exit, "HTTP server shut down gracefully");
        Ok(exit)
    }

    /// Get a reference to the router
    pub fn router(&self) -> &Router {
        &self.router
    }
}

async fn handle_timeout_error(err: BoxError) -> Response {
    if err.is::<tower::timeout::error::Elapsed>() {
        let error = ErrorResponse::new("Timeout".to_string(), "Request timed out".to_string());
        (StatusCode::REQUEST_TIMEOUT, Json(error)).into_response()
    } else {
        WizardError::Transport(err.to_string()).into_response()
    }
}

/// Poll the scheduler and start whatever fell due since the last tick
async fn schedule_loop(hub_service: Arc<HubService>) {
    let mut interval = tokio::time::interval(SCHEDULE_TICK);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut since = Utc::now();
    loop {
        interval.tick().await;
        let now = Utc::now();
        hub_service.run_due_schedules(since, now).await;
        since = now;
    }
}

/// Wait for Ctrl+C, SIGTERM or a stop/restart request
async fn shutdown_signal(control: ServerControl) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
            control.request(ServerExit::Stop);
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
            control.request(ServerExit::Stop);
        },
        exit = control.wait() => {
            warn!(exit = ?exit, "Shutdown requested by hub client");
        },
    }

    info!("Initiating graceful shutdown...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config::defaults().unwrap();
        config.server.port = 0;
        config.storage.profiles_dir = dir.join("profiles");
        config.storage.output_dir = dir.join("configs");
        config
    }

    #[tokio::test]
    async fn test_control_wait_sees_earlier_request() {
        let control = ServerControl::new();
        assert_eq!(control.requested(), None);

        control.request(ServerExit::Restart);
        assert_eq!(control.wait().await, ServerExit::Restart);
    }

    #[tokio::test]
    async fn test_control_wait_wakes_on_request() {
        let control = ServerControl::new();
        let waiter = tokio::spawn({
            let control = control.clone();
            async move { control.wait().await }
        });

        tokio::task::yield_now().await;
        control.request(ServerExit::Stop);
        assert_eq!(waiter.await.unwrap(), ServerExit::Stop);
    }

    #[tokio::test]
    async fn test_api_server_creation_loads_saved_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let first = ApiServer::new(config.clone()).await.unwrap();
        first
            .hub_service
            .store()
            .create("Foo", &crate::hub::Origin::System)
            .await
            .unwrap();

        let second = ApiServer::new(config).await.unwrap();
        assert!(second.hub_service.store().contains("Foo").await);
    }

    #[tokio::test]
    async fn test_router_echoes_trace_header() {
        let dir = tempfile::tempdir().unwrap();
        let server = ApiServer::new(test_config(dir.path())).await.unwrap();

        let response = server
            .router()
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(crate::api::middleware::TRACE_ID_HEADER));
    }

    #[tokio::test]
    async fn test_restart_closes_hub_connections() {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::tungstenite::Message;

        let dir = tempfile::tempdir().unwrap();
        let server = ApiServer::new(test_config(dir.path())).await.unwrap();
        let service = server.hub_service.clone();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(server.serve_on(listener));

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/hub", addr))
            .await
            .unwrap();
        match tokio::time::timeout(Duration::from_secs(5), socket.next()).await.unwrap() {
            Some(Ok(Message::Text(text))) => assert!(text.contains("Connected")),
            other => panic!("unexpected greeting {:?}", other),
        }

        socket
            .send(Message::Text(r#"{"type":"RestartServer"}"#.to_string()))
            .await
            .unwrap();
        let exit = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(exit, ServerExit::Restart);
        assert_eq!(service.hub().connection_count().await, 0);

        // the old service must not act on anything sent after the restart
        let _ = socket
            .send(Message::Text(
                r#"{"type":"CreateProfile","payload":{"name":"Ghost"}}"#.to_string(),
            ))
            .await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(Ok(message)) = socket.next().await {
                if let Message::Close(_) = message {
                    break;
                }
            }
        })
        .await
        .unwrap();

        assert!(!service.store().contains("Ghost").await);
        assert_eq!(std::fs::read_dir(dir.path().join("profiles")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_serve_returns_requested_exit() {
        let dir = tempfile::tempdir().unwrap();
        let server = ApiServer::new(test_config(dir.path())).await.unwrap();
        let control = server.control();

        let handle = tokio::spawn(server.serve());
        tokio::time::sleep(Duration::from_millis(50)).await;
        control.request(ServerExit::Restart);

        let exit = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(exit, ServerExit::Restart);
    }
}
