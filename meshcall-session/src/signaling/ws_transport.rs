use crate::error::TransportError;
use crate::signaling::{SignalTransport, TransportEvent};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use meshcall_core::{ClientFrame, JoinRequest, ServerFrame, Topic};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// [`SignalTransport`] over a WebSocket connection to a relay serving
/// [`crate::signaling::relay_router`].
///
/// A background task owns the socket and reconnects with exponential
/// back-off. `join` and `publish` resolve once the frame has been written
/// to the socket. Frames that never make it, because the socket was down
/// or dropped before their turn, are refused with
/// [`TransportError::NotConnected`] so the caller can queue them.
pub struct WsTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
    connected: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
}

impl WsTransport {
    pub fn connect(url: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_connection(
            url.into(),
            outbound_rx,
            events,
            connected.clone(),
            shutdown.clone(),
        ));

        let transport = Self {
            outbound,
            connected,
            shutdown,
        };
        (transport, events_rx)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, frame: ClientFrame) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let (ack, written) = oneshot::channel();
        self.outbound
            .send(Outbound {
                frame,
                ack: Some(ack),
            })
            .map_err(|_| TransportError::Closed)?;
        written.await.map_err(|_| TransportError::Closed)?
    }
}

/// A frame waiting for the socket, with the caller to notify once it was
/// written or refused.
struct Outbound {
    frame: ClientFrame,
    ack: Option<oneshot::Sender<Result<(), TransportError>>>,
}

impl Outbound {
    fn settle(self, result: Result<(), TransportError>) {
        if let Some(ack) = self.ack {
            let _ = ack.send(result);
        }
    }
}

/// Refuses everything still queued for a socket that is gone.
fn refuse_queued(outbound_rx: &mut mpsc::UnboundedReceiver<Outbound>) -> usize {
    let mut refused = 0;
    while let Ok(outbound) = outbound_rx.try_recv() {
        outbound.settle(Err(TransportError::NotConnected));
        refused += 1;
    }
    if refused > 0 {
        debug!("Refused {} frames queued for a lost socket", refused);
    }
    refused
}

#[async_trait]
impl SignalTransport for WsTransport {
    async fn join(&self, request: JoinRequest) -> Result<(), TransportError> {
        self.send(ClientFrame::Join(request)).await
    }

    async fn publish(&self, topic: Topic, frame: String) -> Result<(), TransportError> {
        self.send(ClientFrame::Publish { topic, frame }).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.shutdown.store(true, Ordering::SeqCst);
        if self.is_connected() {
            let _ = self.outbound.send(Outbound {
                frame: ClientFrame::Leave,
                ack: None,
            });
        }
        Ok(())
    }
}

async fn run_connection(
    url: String,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<TransportEvent>,
    connected: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
) {
    let mut backoff = INITIAL_BACKOFF;

    while !shutdown.load(Ordering::SeqCst) {
        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                info!("Connected to relay at {}", url);
                backoff = INITIAL_BACKOFF;

                refuse_queued(&mut outbound_rx);
                connected.store(true, Ordering::SeqCst);
                if events.send(TransportEvent::Connected).is_err() {
                    return;
                }

                let finished = pump(stream, &mut outbound_rx, &events).await;
                connected.store(false, Ordering::SeqCst);
                refuse_queued(&mut outbound_rx);
                if finished || shutdown.load(Ordering::SeqCst) {
                    info!("Relay connection closed");
                    return;
                }

                warn!("Lost relay connection, reconnecting");
                if events.send(TransportEvent::Disconnected).is_err() {
                    return;
                }
            }
            Err(e) => warn!("Relay at {} unreachable: {}", url, e),
        }

        let retry = tokio::time::sleep(backoff);
        tokio::pin!(retry);
        loop {
            tokio::select! {
                _ = &mut retry => break,
                Some(outbound) = outbound_rx.recv() => {
                    outbound.settle(Err(TransportError::NotConnected));
                }
            }
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// Moves frames both ways until the socket drops. Returns `true` when the
/// connection was closed on purpose.
async fn pump(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    outbound_rx: &mut mpsc::UnboundedReceiver<Outbound>,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> bool {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                let Some(outbound) = outbound else {
                    let _ = write.close().await;
                    return true;
                };
                let leaving = matches!(outbound.frame, ClientFrame::Leave);
                let json = match serde_json::to_string(&outbound.frame) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to serialize relay frame: {}", e);
                        outbound.settle(Err(TransportError::Io(e.to_string())));
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(json)).await {
                    warn!("Relay send failed: {}", e);
                    outbound.settle(Err(TransportError::NotConnected));
                    return false;
                }
                outbound.settle(Ok(()));
                if leaving {
                    let _ = write.close().await;
                    return true;
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerFrame>(&text) {
                            Ok(ServerFrame::Deliver { topic, frame }) => {
                                if events.send(TransportEvent::Frame { topic, frame }).is_err() {
                                    return true;
                                }
                            }
                            Err(e) => warn!("Invalid frame from relay: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return false,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Relay socket error: {}", e);
                        return false;
                    }
                }
            }
        }
    }
}
