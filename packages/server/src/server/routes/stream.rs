//! Real-time news over WebSocket.
//!
//! GET /api/v1/ws/news/:topic
//!
//! Connecting ensures the topic is tracked so the crawler picks it up. Every
//! entry the change relay broadcasts for the topic is pushed as one JSON text
//! frame. Client messages are ignored until close.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Path,
    },
    response::Response,
};
use tokio::sync::mpsc;

use crate::kernel::{Connection, StreamHub};
use crate::server::app::AxumAppState;
use crate::server::error::{validated_topic, ApiError};

pub async fn news_stream_handler(
    Extension(state): Extension<AxumAppState>,
    Path(topic): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let topic = validated_topic(&topic)?;
    state.store.add_topic(&topic).await?;

    let hub = state.stream_hub.clone();
    Ok(ws.on_upgrade(move |socket| serve_subscriber(socket, hub, topic)))
}

async fn serve_subscriber(socket: WebSocket, hub: StreamHub, topic: String) {
    let (connection, rx) = hub.open_connection();
    if !hub.subscribe(&topic, connection.clone()).await {
        return;
    }
    tracing::info!(topic = %topic, connection = connection.id(), "Subscriber connected");

    pump(socket, rx, &connection).await;

    hub.unsubscribe(&topic, &connection).await;
    tracing::info!(topic = %topic, connection = connection.id(), "Subscriber disconnected");
}

async fn pump(mut socket: WebSocket, mut rx: mpsc::Receiver<Arc<str>>, connection: &Connection) {
    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = socket.send(Message::Text(frame.to_string())).await {
                    tracing::debug!(connection = connection.id(), error = %e, "WebSocket send failed");
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(connection = connection.id(), error = %e, "WebSocket receive failed");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
