//! WebSocket edge
//!
//! One duplex connection per speaker or listener. Inbound frames decode
//! into client events for the hub; outbound events queue on a bounded
//! per-connection channel drained by a writer task, so one slow socket
//! never blocks the hub.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use relay_transport::{decode, encode, ServerEvent};

use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    state.metrics.connection_opened();
    tracing::debug!(conn = %conn_id, "connection opened");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(state.settings.server.outbound_queue_size);

    let writer_conn = conn_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match encode(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(conn = %writer_conn, error = %e, "failed to encode event");
                    continue;
                }
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match decode(&text) {
                Ok(event) => state.hub.handle_event(&conn_id, &tx, event).await,
                Err(e) => {
                    tracing::debug!(conn = %conn_id, error = %e, "undecodable frame");
                    let _ = tx.try_send(ServerEvent::Error {
                        message: "malformed event".to_string(),
                    });
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn = %conn_id, error = %e, "websocket read error");
                state.metrics.transport_error();
                crate::metrics::record_error("transport");
                break;
            }
        }
    }

    state.hub.handle_disconnect(&conn_id).await;
    state.metrics.connection_closed();
    writer.abort();
    tracing::debug!(conn = %conn_id, "connection closed");
}
