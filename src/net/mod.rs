//! Peer-to-peer sync: wire protocol, party session, reconciliation, transport

pub mod protocol;
pub mod reconcile;
pub mod runtime;
pub mod session;
pub mod snapshot;
pub mod transport;

pub use protocol::{Envelope, PeerMsg, PlayerInfo};
pub use runtime::PeerRuntime;
pub use session::{NetworkSession, SessionEvent};
pub use transport::{LocalHub, PeerTransport, TransportEvent};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("invalid party code: {0:?}")]
    InvalidPartyCode(String),
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("could not reach relay after {attempts} attempts")]
    ConnectFailed { attempts: u32 },
    #[error("malformed message: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("transport channel closed")]
    ChannelClosed,
    #[error("websocket error: {0}")]
    WebSocket(String),
}
