// ============================
// studyroom-gateway-lib/src/ws_router.rs
// ============================
//! WebSocket router and connection handling.
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::dispatch;
use crate::AppState;

/// Create the WebSocket router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Handler for WebSocket connections
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    counter!("ws.connection").increment(1);
    gauge!("ws.active").increment(1.0);

    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut tx, mut rx) = socket.split();

    // Outbound frames funnel through a channel so any component can
    // address this connection without holding the socket.
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();
    let conn = state.sessions.connect(client_tx);
    info!(%conn, "connection established");

    // Task: forward queued frames to the socket.
    let send_task = tokio::spawn(async move {
        while let Some(frame) = client_rx.recv().await {
            if tx.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Main loop: decode and dispatch every text chunk.
    while let Some(Ok(message)) = rx.next().await {
        match message {
            Message::Text(text) => {
                dispatch::handle_message(&state, conn, &text).await;
            }
            Message::Close(_) => break,
            _ => {} // Ignore binary and low-level ping/pong
        }
    }

    // Cleanup: the disconnect path runs the same departure broadcast
    // and room pruning as an explicit LEAVE.
    state.disconnect(conn);
    gauge!("ws.active").decrement(1.0);
    debug!(%conn, "connection closed");

    send_task.abort();
}
