//! Message transport between a peer and its party.
//!
//! The protocol only needs "send a message to the party" and "receive
//! stamped messages from the party". Two transports provide that: the
//! WebSocket relay connector and an in-memory hub.

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::protocol::{decode_envelope, encode, Envelope, PeerMsg};
use super::NetError;

const OUTBOUND_CAPACITY: usize = 256;
const INBOUND_CAPACITY: usize = 1024;
/// Linear backoff step between connect attempts
const RETRY_BACKOFF: Duration = Duration::from_millis(500);
/// How long teardown waits for queued frames to reach the socket
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// What a peer sees arrive from its party
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(Envelope),
    /// The link to the party is gone
    Closed,
}

/// Outbound half of a transport. Delivery is fire-and-forget.
pub trait MessageSink: Send + Sync {
    fn deliver(&self, msg: PeerMsg) -> Result<(), NetError>;
}

/// Sink feeding a writer task
pub struct ChannelSink(mpsc::Sender<PeerMsg>);

impl MessageSink for ChannelSink {
    fn deliver(&self, msg: PeerMsg) -> Result<(), NetError> {
        match self.0.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(msg)) => {
                warn!(kind = msg.kind(), "Outbound queue full, dropping message");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(NetError::ChannelClosed),
        }
    }
}

/// A peer's connection to its party
pub struct PeerTransport {
    local_id: String,
    sink: Box<dyn MessageSink>,
    inbound: mpsc::Receiver<TransportEvent>,
    closed: bool,
    /// Task draining the sink into the socket, if there is one
    writer: Option<JoinHandle<()>>,
}

impl PeerTransport {
    pub fn new(
        local_id: impl Into<String>,
        sink: Box<dyn MessageSink>,
        inbound: mpsc::Receiver<TransportEvent>,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            sink,
            inbound,
            closed: false,
            writer: None,
        }
    }

    pub fn with_writer(mut self, writer: JoinHandle<()>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn send(&self, msg: PeerMsg) -> Result<(), NetError> {
        self.sink.deliver(msg)
    }

    /// Drop the sink and wait for the writer to flush what is queued and
    /// close the socket
    pub async fn close(self) {
        let Self { local_id, sink, writer, .. } = self;
        drop(sink);
        if let Some(writer) = writer {
            if tokio::time::timeout(FLUSH_TIMEOUT, writer).await.is_err() {
                warn!(peer = %local_id, "Writer did not flush before teardown");
            }
        }
    }

    /// Non-blocking receive. A dropped inbound channel reports `Closed` once.
    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        match self.inbound.try_recv() {
            Ok(event) => {
                if event == TransportEvent::Closed {
                    self.closed = true;
                }
                Some(event)
            }
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                if self.closed {
                    None
                } else {
                    self.closed = true;
                    Some(TransportEvent::Closed)
                }
            }
        }
    }

}

/// In-process party: stamps the sender, never echoes, and announces
/// `player_left` on disconnect, like the relay does.
#[derive(Clone, Default)]
pub struct LocalHub {
    peers: Arc<DashMap<String, mpsc::Sender<TransportEvent>>>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, user_id: impl Into<String>) -> PeerTransport {
        let user_id = user_id.into();
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        self.peers.insert(user_id.clone(), tx);
        let sink = HubSink {
            hub: self.clone(),
            from: user_id.clone(),
        };
        PeerTransport::new(user_id, Box::new(sink), rx)
    }

    /// Drop a peer: it sees `Closed`, everyone else sees `player_left`
    pub fn disconnect(&self, user_id: &str) {
        if let Some((_, tx)) = self.peers.remove(user_id) {
            let _ = tx.try_send(TransportEvent::Closed);
            self.broadcast(user_id, PeerMsg::PlayerLeft {});
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn broadcast(&self, from: &str, msg: PeerMsg) {
        for peer in self.peers.iter() {
            if peer.key() == from {
                continue;
            }
            let event = TransportEvent::Message(Envelope::new(from, msg.clone()));
            if peer.value().try_send(event).is_err() {
                warn!(peer = %peer.key(), kind = msg.kind(), "Hub peer not receiving, dropped");
            }
        }
    }
}

struct HubSink {
    hub: LocalHub,
    from: String,
}

impl MessageSink for HubSink {
    fn deliver(&self, msg: PeerMsg) -> Result<(), NetError> {
        if !self.hub.peers.contains_key(&self.from) {
            return Err(NetError::ChannelClosed);
        }
        self.hub.broadcast(&self.from, msg);
        Ok(())
    }
}

/// Connect to the party relay with bounded retry and linear backoff
pub async fn connect_ws(
    relay_url: &str,
    party_code: &str,
    user_id: &str,
    attempts: u32,
) -> Result<PeerTransport, NetError> {
    let attempts = attempts.max(1);
    let base = relay_url.trim_end_matches('/');
    let url = format!("{}/party/{}?userId={}", base, party_code, user_id);

    for attempt in 1..=attempts {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                info!(party = %party_code, attempt, "Connected to relay");
                return Ok(spawn_pumps(stream, user_id));
            }
            Err(e @ tokio_tungstenite::tungstenite::Error::Url(_)) => {
                return Err(NetError::WebSocket(e.to_string()));
            }
            Err(e) => {
                warn!(party = %party_code, attempt, error = %e, "Relay connect failed");
                if attempt < attempts {
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
            }
        }
    }

    Err(NetError::ConnectFailed { attempts })
}

/// Split the socket into a writer task fed by the sink and a reader task
/// feeding the inbound channel
fn spawn_pumps(stream: WebSocketStream<MaybeTlsStream<TcpStream>>, user_id: &str) -> PeerTransport {
    let (mut ws_sink, mut ws_stream) = stream.split();
    let (out_tx, mut out_rx) = mpsc::channel::<PeerMsg>(OUTBOUND_CAPACITY);
    let (in_tx, in_rx) = mpsc::channel::<TransportEvent>(INBOUND_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let text = match encode(&msg) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to encode message");
                    continue;
                }
            };
            if let Err(e) = ws_sink.send(Message::Text(text)).await {
                debug!(error = %e, "Relay send failed");
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    tokio::spawn(async move {
        while let Some(frame) = ws_stream.next().await {
            match frame {
                Ok(Message::Text(text)) => match decode_envelope(&text) {
                    Ok(envelope) => {
                        if in_tx.send(TransportEvent::Message(envelope)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Dropping malformed relay message"),
                },
                Ok(Message::Close(_)) => {
                    info!("Relay closed the connection");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Relay connection error");
                    break;
                }
            }
        }
        let _ = in_tx.send(TransportEvent::Closed).await;
    });

    PeerTransport::new(user_id, Box::new(ChannelSink(out_tx)), in_rx).with_writer(writer)
}
