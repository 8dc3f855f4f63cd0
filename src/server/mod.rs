// src/server/mod.rs

//! The service acceptor: WebSocket subscriptions plus thin JSON status
//! routes, with graceful shutdown of all background tasks.

use anyhow::Result;
use axum::{Json, Router, extract::FromRef, extract::State, routing::get};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info};

pub mod ws;

use crate::core::health::ScoreSummary;
use crate::core::notify::NotificationProcessorTask;
use crate::core::state::{AppInit, AppState};
use crate::core::tasks::MonitorStatus;

/// Grace period for background tasks after the stop signal.
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(10);

/// Router state: the shared application state plus the shutdown broadcast,
/// which every WebSocket session subscribes to so live sockets close
/// promptly when the service stops.
#[derive(Clone)]
pub struct GatewayState {
    pub app: Arc<AppState>,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl FromRef<GatewayState> for Arc<AppState> {
    fn from_ref(gateway: &GatewayState) -> Self {
        gateway.app.clone()
    }
}

/// Runs the service until interrupted: spawns the queue processor, starts
/// the monitor when paths are configured, and serves the acceptor.
pub async fn run(init: AppInit) -> Result<()> {
    let AppInit {
        state,
        notification_rx,
    } = init;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let processor =
        NotificationProcessorTask::new(state.notifications.clone(), notification_rx);
    let processor_handle = tokio::spawn(processor.run(shutdown_tx.subscribe()));

    if !state.config.monitor.paths.is_empty() {
        state.monitor.start(Vec::new()).await;
    }

    let app = router(GatewayState {
        app: state.clone(),
        shutdown_tx: shutdown_tx.clone(),
    });
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("ShareGuard listening on http://{addr}");

    let shutdown_state = state.clone();
    let shutdown_broadcast = shutdown_tx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_interrupt().await;
            info!("Shutdown signal received.");
            shutdown_state.monitor.stop().await;
            let _ = shutdown_broadcast.send(());
        })
        .await?;

    if tokio::time::timeout(SHUTDOWN_GRACE, processor_handle)
        .await
        .is_err()
    {
        error!("Notification processor did not stop within the grace period.");
    }
    info!("Shutdown complete.");
    Ok(())
}

fn router(gateway: GatewayState) -> Router {
    Router::new()
        .route("/ws/notifications", get(ws::subscribe_handler))
        .route("/api/monitor/status", get(monitor_status))
        .route("/api/health/score", get(health_score))
        .with_state(gateway)
}

async fn monitor_status(State(state): State<Arc<AppState>>) -> Json<MonitorStatus> {
    Json(state.monitor.status())
}

async fn health_score(State(state): State<Arc<AppState>>) -> Json<ScoreSummary> {
    Json(state.health.current_score())
}

async fn wait_for_interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install interrupt handler: {e}");
        std::future::pending::<()>().await;
    }
}
