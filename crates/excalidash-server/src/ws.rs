//! Live channel: one task per WebSocket connection.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use excalidash_core::sync::{ClientMessage, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::rooms::RoomCoordinator;
use crate::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let rooms = state.rooms.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, rooms))
}

/// Decode a client frame, or produce the error reply for it.
pub fn decode(text: &str) -> Result<ClientMessage, ServerMessage> {
    serde_json::from_str::<ClientMessage>(text).map_err(|e| ServerMessage::Error {
        message: format!("Invalid message: {}", e),
    })
}

async fn handle_socket(socket: WebSocket, rooms: Arc<RoomCoordinator>) {
    let conn_id = Uuid::new_v4().to_string();
    info!("New connection: {}", conn_id);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match decode(&text) {
                        Ok(client_msg) => rooms.handle(&conn_id, client_msg, &tx),
                        Err(reply) => {
                            warn!("Invalid message from {}", conn_id);
                            let _ = tx.send(reply);
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary, ping, pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", conn_id, e);
                        break;
                    }
                }
            }

            Some(outgoing) = rx.recv() => {
                match serde_json::to_string(&outgoing) {
                    Ok(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!("Failed to encode message for {}: {}", conn_id, e),
                }
            }
        }
    }

    rooms.leave(&conn_id);
    info!("Connection closed: {}", conn_id);
}
