//! WebSocket handler: streams fan-out messages to one client.
//!
//! Each connection owns one subscription. Messages are serialized as JSON
//! text frames; a `gap` message means events were dropped because the client
//! fell behind. The stream ends when the client closes, when the fan-out is
//! closed, or on shutdown.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use beadline_core::{BeadId, BeadState};
use beadline_events::{EventFilter, FanoutMessage, Subscription};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Subscription filter taken from the upgrade request's query string.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub lane: Option<String>,
    pub bead_id: Option<BeadId>,
    pub state: Option<String>,
}

impl WsQuery {
    pub fn into_filter(self) -> Result<EventFilter, ApiError> {
        let state = self
            .state
            .map(|s| s.parse::<BeadState>())
            .transpose()
            .map_err(ApiError::BadRequest)?;
        Ok(EventFilter {
            lane: self.lane,
            bead_id: self.bead_id,
            state,
        })
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = query.into_filter()?;
    // Subscribe before the upgrade so no event between the two is missed.
    let subscription = state.daemon.fanout().subscribe(filter);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, subscription)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, mut subscription: Subscription) {
    let connection_id = subscription.id();
    info!(%connection_id, filter = ?subscription.filter(), "WebSocket subscriber connected");

    let (mut sender, mut receiver) = socket.split();
    let shutdown = state.daemon.shutdown().token();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!(%connection_id, "Closing WebSocket for shutdown");
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(%connection_id, error = %e, "WebSocket receive error");
                    break;
                }
            },
            message = subscription.recv() => {
                let Some(message) = message else {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };
                if !send_message(&mut sender, &message).await {
                    break;
                }
            }
        }
    }

    info!(%connection_id, "WebSocket subscriber disconnected");
}

async fn send_message(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    message: &FanoutMessage,
) -> bool {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to serialize fan-out message");
            return true;
        }
    };
    sender.send(Message::Text(json.into())).await.is_ok()
}
