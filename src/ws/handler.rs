//! Party relay WebSocket handler
//!
//! The relay never interprets game messages. It stamps each text frame
//! with the sender's id and fans it out to the rest of the party.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::util::party_code;
use crate::util::rate_limit::PeerRateLimiter;
use crate::ws::party::{PartyHandle, RelayFrame};

#[derive(Debug, Deserialize)]
pub struct PartyQuery {
    #[serde(rename = "userId", default)]
    pub user_id: String,
}

/// `GET /party/:code?userId=...`
pub async fn party_ws(
    ws: WebSocketUpgrade,
    Path(code): Path<String>,
    Query(query): Query<PartyQuery>,
    State(state): State<AppState>,
) -> Response {
    let code = match party_code::normalize(&code) {
        Ok(code) => code,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let user_id = query.user_id.trim().to_string();
    if user_id.is_empty() {
        return (StatusCode::BAD_REQUEST, "userId is required").into_response();
    }
    if !state.parties.has_room(&code) {
        warn!(party = %code, user_id = %user_id, "Party full, refusing upgrade");
        return (StatusCode::CONFLICT, "party is full").into_response();
    }

    info!(party = %code, user_id = %user_id, "WebSocket upgrade for party member");
    ws.on_upgrade(move |socket| handle_socket(socket, code, user_id, state))
}

async fn handle_socket(mut socket: WebSocket, code: String, user_id: String, state: AppState) {
    // The room check above races with other upgrades; join is authoritative
    let (party, frames) = match state.parties.join(&code, &user_id) {
        Ok(joined) => joined,
        Err(e) => {
            warn!(party = %code, user_id = %user_id, error = %e, "Join refused");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    info!(
        party = %code,
        user_id = %user_id,
        peers = state.parties.total_peers(),
        "Peer joined party"
    );

    run_session(&user_id, &party, socket, frames).await;

    state.parties.leave(&code, &user_id);
    if let Some(text) = stamp(r#"{"type":"player_left"}"#, &user_id) {
        let _ = party.tx.send(RelayFrame {
            from: user_id.clone(),
            text: Arc::from(text),
        });
    }
    info!(party = %code, user_id = %user_id, "Peer left party");
}

async fn run_session(
    user_id: &str,
    party: &PartyHandle,
    socket: WebSocket,
    mut frames: broadcast::Receiver<RelayFrame>,
) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let rate_limiter = PeerRateLimiter::new();

    let writer_user_id = user_id.to_string();
    let writer_handle = tokio::spawn(async move {
        loop {
            match frames.recv().await {
                Ok(frame) => {
                    if frame.from == writer_user_id {
                        continue;
                    }
                    if let Err(e) = ws_sink.send(Message::Text(frame.text.to_string())).await {
                        debug!(user_id = %writer_user_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        user_id = %writer_user_id,
                        lagged_count = n,
                        "Peer lagged, skipped {} messages", n
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(user_id = %writer_user_id, "Party channel closed");
                    break;
                }
            }
        }
    });

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_message() {
                    warn!(user_id = %user_id, party = %party.code, "Rate limited relay message");
                    continue;
                }
                match stamp(&text, user_id) {
                    Some(stamped) => {
                        let _ = party.tx.send(RelayFrame {
                            from: user_id.to_string(),
                            text: Arc::from(stamped),
                        });
                    }
                    None => warn!(user_id = %user_id, "Dropping non-object message"),
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(user_id = %user_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "Peer initiated close");
                break;
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Overwrite `from` on a JSON object. Anything else is rejected.
fn stamp(text: &str, from: &str) -> Option<String> {
    let mut value: serde_json::Value = serde_json::from_str(text).ok()?;
    let object = value.as_object_mut()?;
    object.insert("from".to_string(), serde_json::Value::String(from.to_string()));
    serde_json::to_string(&value).ok()
}
