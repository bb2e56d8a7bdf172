//! WebSocket transport for the hub
//!
//! One task writes the connection's event queue to the socket while the
//! upgrade task reads frames and handles them strictly one after another.
//! Both end when the server shuts down: the reader stops taking frames, and
//! the writer flushes what is queued and sends a close frame.

use crate::hub::dispatcher::HubService;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How long a closing connection may spend flushing queued events
const WRITER_DRAIN: Duration = Duration::from_secs(2);

/// `GET /hub`
pub async fn hub_socket(
    ws: WebSocketUpgrade,
    State(service): State<Arc<HubService>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_connection(socket, service))
}

async fn serve_connection(socket: WebSocket, service: Arc<HubService>) {
    let (mut sink, mut stream) = socket.split();
    let (connection_id, mut events) = service.hub().connect().await;

    let mut writer = {
        let connection_id = connection_id.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(connection_id = %connection_id, event = event.name(), error = %e, "Failed to encode event");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    debug!(connection_id = %connection_id, "Socket closed while sending");
                    return;
                }
            }
            // queue closed by disconnect
            let _ = sink.send(Message::Close(None)).await;
        })
    };

    loop {
        let frame = tokio::select! {
            biased;
            exit = service.closing() => {
                debug!(connection_id = %connection_id, exit = ?exit, "Closing hub connection for server shutdown");
                break;
            }
            frame = stream.next() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        match frame {
            Ok(Message::Text(text)) => service.handle_text(&connection_id, &text).await,
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => service.handle_text(&connection_id, text).await,
                Err(_) => service.handle_text(&connection_id, "").await,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(connection_id = %connection_id, error = %e, "Socket read failed");
                break;
            }
        }
    }

    service.hub().disconnect(&connection_id).await;
    if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        debug!(connection_id = %connection_id, "Writer did not finish in time");
        writer.abort();
    }
}
