//! `SafetrailServer`: router assembly, listener and graceful shutdown.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use safetrail_geofence::{GeofenceEngine, ZoneSource};
use safetrail_settings::{SafetrailSettings, ServerSettings};
use tokio::task::JoinHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::housekeeper::Housekeeper;
use crate::http::{ApiError, emergencies, geo, status};
use crate::hub::Hub;
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::SessionSupervisor;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Sessions, alerts and zones.
    pub hub: Arc<Hub>,
    /// Server section of the settings.
    pub config: Arc<ServerSettings>,
    /// Prometheus handle for `/metrics`, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The safetrail server.
pub struct SafetrailServer {
    settings: SafetrailSettings,
    hub: Arc<Hub>,
    shutdown: ShutdownCoordinator,
    metrics: Option<PrometheusHandle>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SafetrailServer {
    /// Server over `zones`. Nothing runs until [`listen`](Self::listen).
    pub fn new(settings: &SafetrailSettings, zones: Arc<dyn ZoneSource>) -> Self {
        let shutdown = ShutdownCoordinator::new();
        let geofence = GeofenceEngine::new(zones, settings.geofence.cache_ttl());
        let hub = Arc::new(Hub::new(settings, geofence, shutdown.token()));
        Self {
            settings: settings.clone(),
            hub,
            shutdown,
            metrics: None,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// The shared hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: Arc::clone(&self.hub),
            config: Arc::new(self.settings.server.clone()),
            metrics: self.metrics.clone(),
        };
        let expose = self.settings.server.expose_internal_errors;

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/emergencies", get(emergencies::list))
            .route("/emergencies/panic-alert", post(emergencies::panic_alert))
            .route("/emergencies/ml-alert", post(emergencies::ml_alert))
            .route("/emergencies/{id}", get(emergencies::get_one))
            .route("/emergencies/{id}/acknowledge", post(emergencies::acknowledge))
            .route("/emergencies/{id}/resolve", post(emergencies::resolve))
            .route("/geo/check", get(geo::check))
            .route("/geo/boundaries", get(geo::boundaries))
            .route("/geo/nearest", get(geo::nearest))
            .route("/websocket/status", get(status::websocket_status))
            .route("/health", get(status::health))
            .route("/metrics", get(status::metrics))
            .with_state(state)
            .layer(CatchPanicLayer::custom(
                move |panic: Box<dyn Any + Send + 'static>| panic_response(&*panic, expose),
            ))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind, start serving and start the sweeps. Returns the bound address.
    pub async fn listen(&self) -> std::io::Result<SocketAddr> {
        let listener = tokio::net::TcpListener::bind(self.settings.server.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();

        let serve = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "http server failed");
            }
        });
        let sweeps = Arc::new(Housekeeper::new(
            Arc::clone(&self.hub),
            &self.settings.housekeeping,
        ))
        .spawn(&self.shutdown.token());

        let mut tasks = self.tasks.lock();
        tasks.push(serve);
        tasks.extend(sweeps);
        info!(%addr, "safetrail listening");
        Ok(addr)
    }

    /// Cancel everything and wait, bounded by the shutdown timeout, for the
    /// listener, the sweeps and every session to finish.
    pub async fn shutdown_gracefully(&self) {
        let timeout = self.settings.server.shutdown_timeout();
        let handles = std::mem::take(&mut *self.tasks.lock());
        let report = self.shutdown.stop(handles, &self.hub.registry, timeout).await;
        info!(clean = report.is_clean(), "safetrail stopped");
    }
}

/// `GET /ws`
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.hub.registry.len() >= state.config.max_connections {
        metrics::counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(limit = state.config.max_connections, "connection limit reached");
        return ApiError::Unavailable("Connection limit reached".into()).into_response();
    }
    let ping_interval = state.config.heartbeat_interval();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| SessionSupervisor::run(state.hub, socket, ping_interval))
}

fn panic_response(panic: &(dyn Any + Send), expose: bool) -> Response {
    let cause = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("handler panicked");
    ApiError::internal(&cause, expose).into_response()
}
