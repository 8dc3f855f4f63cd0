// src/server/ws.rs

//! The WebSocket subscription endpoint. Each connection registers with the
//! notification service and runs its own inbound read loop; delivery happens
//! through the service's queue processor. Every session also watches the
//! shutdown broadcast so live sockets are closed proactively when the
//! service stops, instead of lingering until the client hangs up.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::stream::{SplitSink, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use crate::core::errors::ShareGuardError;
use crate::core::notify::{ClientMessage, NotificationSink, SubscriptionFilters};
use crate::core::state::AppState;

use super::GatewayState;

#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    pub user_id: Option<String>,
    /// Initial filters as a JSON document; clients can also update them
    /// later with an `update_filters` message.
    pub filters: Option<String>,
}

/// Upgrades the connection and hands it to the session loop.
pub async fn subscribe_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<SubscribeQuery>,
    State(gateway): State<GatewayState>,
) -> impl IntoResponse {
    let shutdown_rx = gateway.shutdown_tx.subscribe();
    ws.on_upgrade(move |socket| run_session(gateway.app, socket, query, shutdown_rx))
}

/// The write half of a subscription socket, behind the sink seam.
struct WebSocketSink {
    tx: Mutex<SplitSink<WebSocket, Message>>,
}

impl WebSocketSink {
    /// Sends a Close frame; errors are irrelevant at this point.
    async fn close(&self) {
        let _ = self.tx.lock().await.send(Message::Close(None)).await;
    }
}

#[async_trait]
impl NotificationSink for WebSocketSink {
    async fn send(&self, payload: String) -> Result<(), ShareGuardError> {
        self.tx
            .lock()
            .await
            .send(Message::Text(payload.into()))
            .await
            .map_err(|e| ShareGuardError::NotificationSend(e.to_string()))
    }
}

async fn run_session(
    state: Arc<AppState>,
    socket: WebSocket,
    query: SubscribeQuery,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let filters = query
        .filters
        .as_deref()
        .and_then(|raw| match serde_json::from_str::<SubscriptionFilters>(raw) {
            Ok(filters) => Some(filters),
            Err(e) => {
                warn!("Ignoring malformed subscription filters: {e}");
                None
            }
        })
        .unwrap_or_default();

    let (write_half, mut read_half) = socket.split();
    let sink = Arc::new(WebSocketSink {
        tx: Mutex::new(write_half),
    });

    let subscription_id = state
        .notifications
        .connect(sink.clone(), query.user_id, filters)
        .await;

    loop {
        tokio::select! {
            message = read_half.next() => {
                let message = match message {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        debug!("WebSocket read error for {subscription_id}: {e}");
                        break;
                    }
                    None => break,
                };

                match message {
                    Message::Text(text) => {
                        match serde_json::from_str::<ClientMessage>(text.as_str()) {
                            Ok(client_message) => {
                                if let Err(e) = state
                                    .notifications
                                    .handle_client_message(subscription_id, client_message)
                                    .await
                                {
                                    debug!("Ending session {subscription_id}: {e}");
                                    break;
                                }
                            }
                            Err(e) => debug!("Ignoring malformed client message: {e}"),
                        }
                    }
                    Message::Close(_) => {
                        info!("Client closed subscription {subscription_id}");
                        break;
                    }
                    _ => {}
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Closing subscription {subscription_id} for shutdown");
                sink.close().await;
                break;
            }
        }
    }

    state.notifications.disconnect(subscription_id);
}
