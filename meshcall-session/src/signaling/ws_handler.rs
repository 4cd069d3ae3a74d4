use crate::signaling::{LocalRelay, TransportEvent};
use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use meshcall_core::{ClientFrame, PeerId, ServerFrame, SessionCode};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{error, info, warn};

/// Router serving a [`LocalRelay`] on `/ws`.
pub fn relay_router(relay: LocalRelay) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(relay)
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(relay): State<LocalRelay>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, relay))
}

type Membership = Arc<Mutex<Option<(SessionCode, PeerId)>>>;

async fn handle_socket(socket: WebSocket, relay: LocalRelay) {
    info!("New relay connection");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<TransportEvent>();
    let membership: Membership = Arc::new(Mutex::new(None));

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let TransportEvent::Frame { topic, frame } = event else {
                continue;
            };
            let json = match serde_json::to_string(&ServerFrame::Deliver { topic, frame }) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize relay frame: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let relay = relay.clone();
        let membership = membership.clone();
        let tx = tx.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                        Ok(ClientFrame::Join(request)) => {
                            *membership.lock().await =
                                Some((request.session_code.clone(), request.peer_id));
                            relay.attach(request, tx.clone());
                        }
                        Ok(ClientFrame::Publish { topic, frame }) => {
                            let current = membership.lock().await.clone();
                            let Some((session_code, peer_id)) = current else {
                                warn!("Publish before join, dropping frame");
                                continue;
                            };
                            if let Err(e) = relay.publish(&session_code, &peer_id, topic, frame) {
                                warn!("Relay publish from {} failed: {}", peer_id, e);
                            }
                        }
                        Ok(ClientFrame::Leave) => break,
                        Err(e) => warn!("Invalid relay frame: {}", e),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    if let Some((session_code, peer_id)) = membership.lock().await.take() {
        relay.detach_subscription(&session_code, &peer_id, &tx);
    }
    info!("Relay connection closed");
}
