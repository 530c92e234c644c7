//! WebSocket signaling client
//!
//! One connection to the relay, one attempt, no reconnection. Inbound frames
//! are parsed and delivered in order on an mpsc channel; the channel ends with
//! an [`InboundEvent::Disconnected`] once the socket goes away.

use crate::domain::shared::{DomainError, ParticipantId, Result};
use crate::domain::signaling::{InboundEvent, SignalingChannel, SignalingMessage};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct WebSocketSignalingClient {
    local_id: ParticipantId,
    tx: mpsc::UnboundedSender<Message>,
    connected: Arc<AtomicBool>,
}

impl WebSocketSignalingClient {
    /// Connect under a freshly generated participant id
    pub async fn connect(
        base_url: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<InboundEvent>)> {
        Self::connect_as(base_url, ParticipantId::generate()).await
    }

    /// Connect to `{base_url}/{local_id}`
    pub async fn connect_as(
        base_url: &str,
        local_id: ParticipantId,
    ) -> Result<(Self, mpsc::UnboundedReceiver<InboundEvent>)> {
        let url = format!("{}/{}", base_url.trim_end_matches('/'), local_id);
        info!("Connecting to signaling relay: {}", url);

        let (ws_stream, _) = connect_async(url.as_str()).await.map_err(|e| {
            DomainError::SignalingDisconnected(format!("Failed to connect to {}: {}", url, e))
        })?;

        info!("Connected to signaling relay as {}", local_id);

        let (write, read) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));

        tokio::spawn(sender_task(write, rx, connected.clone()));
        tokio::spawn(receiver_task(read, events_tx, connected.clone()));

        Ok((
            Self {
                local_id,
                tx,
                connected,
            },
            events_rx,
        ))
    }
}

impl SignalingChannel for WebSocketSignalingClient {
    fn local_id(&self) -> &ParticipantId {
        &self.local_id
    }

    fn send(&self, message: SignalingMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(DomainError::NotConnected);
        }
        debug!("Sending {}", message.kind());
        let json = message.to_json()?;
        self.tx
            .send(Message::Text(json))
            .map_err(|_| DomainError::NotConnected)
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!("Disconnecting from signaling relay");
            let _ = self.tx.send(Message::Close(None));
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Sender task: sends messages from channel to WebSocket
async fn sender_task(
    mut write: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
    connected: Arc<AtomicBool>,
) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if let Err(e) = write.send(msg).await {
            error!("Failed to send WebSocket message: {}", e);
            connected.store(false, Ordering::SeqCst);
            break;
        }
        if closing {
            break;
        }
    }

    debug!("Sender task terminated");
}

/// Receiver task: parses frames and forwards them to the room loop
async fn receiver_task(
    mut read: SplitStream<WsStream>,
    events: mpsc::UnboundedSender<InboundEvent>,
    connected: Arc<AtomicBool>,
) {
    let reason = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => match SignalingMessage::from_json(&text) {
                Ok(message) => {
                    if events.send(InboundEvent::Message(message)).is_err() {
                        break "room loop stopped".to_string();
                    }
                }
                Err(e) => warn!("Dropping signaling frame: {}", e),
            },
            Some(Ok(Message::Close(frame))) => {
                info!("Signaling connection closed by relay");
                break frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "closed by relay".to_string());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!("Signaling WebSocket error: {}", e);
                break e.to_string();
            }
            None => break "connection ended".to_string(),
        }
    };

    connected.store(false, Ordering::SeqCst);
    let _ = events.send(InboundEvent::Disconnected(reason));
    debug!("Receiver task terminated");
}
