//! WebSocket push surface
//!
//! Every connection is a hub subscriber. Sealed batches are forwarded as text
//! frames; inbound frames manage topic subscriptions:
//!
//! ```json
//! { "action": "subscribe", "topic": "predictions" }
//! { "action": "unsubscribe", "topic": "metrics" }
//! ```
//!
//! Malformed frames are discarded and the connection stays open.

use std::time::Duration;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use tokio::time::{Instant, interval_at, timeout};
use tracing::{debug, info, trace};

use crate::{
    api::{state::ApiState, types::ClientFrame},
    hub::{ClientId, Hub},
};

/// Maximum time a single frame write may take
pub const WRITE_WAIT: Duration = Duration::from_secs(10);

/// A connection without any inbound frame for this long is closed
pub const PONG_WAIT: Duration = Duration::from_secs(60);

/// Must be shorter than [`PONG_WAIT`]
pub const PING_PERIOD: Duration = Duration::from_secs(54);

/// Maximum inbound message size in bytes
pub const MAX_MESSAGE_SIZE: usize = 512;

/// GET /api/v1/stream
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(|socket| handle_websocket(socket, state.hub))
}

async fn handle_websocket(socket: WebSocket, hub: Hub) {
    let mut subscriber = hub.connect();
    let client_id = subscriber.id;
    for topic in &hub.config().default_topics {
        // the client was registered just above
        let _ = hub.subscribe(client_id, topic);
    }
    info!("WebSocket client {client_id} connected");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        let mut ping = interval_at(Instant::now() + PING_PERIOD, PING_PERIOD);

        loop {
            let message = tokio::select! {
                batch = subscriber.recv() => match batch {
                    Some(batch) => Message::Text(batch.payload.clone()),
                    None => {
                        debug!("client {client_id} evicted by the hub");
                        let _ = timeout(WRITE_WAIT, sender.send(Message::Close(None))).await;
                        break;
                    }
                },
                _ = ping.tick() => Message::Ping(Vec::new()),
            };

            match timeout(WRITE_WAIT, sender.send(message)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("WebSocket send failed, client {client_id} disconnected: {e}");
                    break;
                }
                Err(_) => {
                    debug!("WebSocket write deadline exceeded for client {client_id}");
                    break;
                }
            }
        }
    });

    let recv_hub = hub.clone();
    let mut recv_task = tokio::spawn(async move {
        loop {
            let msg = match timeout(PONG_WAIT, receiver.next()).await {
                Ok(Some(Ok(msg))) => msg,
                Ok(Some(Err(e))) => {
                    debug!("WebSocket read failed for client {client_id}: {e}");
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    debug!("client {client_id} missed the pong deadline");
                    break;
                }
            };

            match msg {
                Message::Text(text) => handle_frame(&recv_hub, client_id, &text),
                Message::Close(_) => break,
                // pings are answered by axum, pongs only refresh the deadline
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    // already gone when the hub evicted the client
    let _ = hub.disconnect(client_id);
    info!("WebSocket client {client_id} disconnected");
}

fn handle_frame(hub: &Hub, client_id: ClientId, text: &str) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            trace!("discarding malformed frame from client {client_id}: {e}");
            return;
        }
    };

    let result = match &frame {
        ClientFrame::Subscribe { topic } => hub.subscribe(client_id, topic),
        ClientFrame::Unsubscribe { topic } => hub.unsubscribe(client_id, topic),
    };

    if let Err(e) = result {
        debug!("failed to apply {frame:?}: {e}");
    }
}
