//! Wire messages exchanged between peers through the party relay.
//! One JSON object per message, discriminated by `type`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::game::{Faction, MatchPhase, PowerUpKind};

use super::NetError;

/// Peer protocol messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PeerMsg {
    /// Joiner asks the host for a faction
    JoinRequest { id: String, username: String },

    /// Host answers a join request
    PlayerAssigned {
        target_id: String,
        faction: Faction,
        players: Vec<PlayerInfo>,
    },

    /// Host announces the updated roster to everyone
    PlayerJoined {
        faction: Faction,
        players: Vec<PlayerInfo>,
    },

    /// Host rejects a joiner: every faction is claimed
    PartyFull { target_id: String },

    /// Client movement vector, last write wins
    PlayerInput { faction: Faction, x: f32, z: f32 },

    /// Periodic authoritative state
    GameState(GameStateMsg),

    /// A soldier changed sides
    Conversion {
        soldier_id: String,
        from_faction: Faction,
        to_faction: Faction,
    },

    /// Match over; `None` is a draw
    GameOver { winner: Option<Faction> },

    /// Sender left the party. Sent by the relay when a socket drops.
    PlayerLeft {},

    /// Host starts (or restarts) a match
    StartMatch { players: Vec<PlayerInfo>, seed: u64 },

    /// Client drags one of its soldiers during placement
    PlacementMove {
        faction: Faction,
        soldier_id: String,
        x: f32,
        z: f32,
    },
}

impl PeerMsg {
    /// Tag string, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            PeerMsg::JoinRequest { .. } => "join_request",
            PeerMsg::PlayerAssigned { .. } => "player_assigned",
            PeerMsg::PlayerJoined { .. } => "player_joined",
            PeerMsg::PartyFull { .. } => "party_full",
            PeerMsg::PlayerInput { .. } => "player_input",
            PeerMsg::GameState(_) => "game_state",
            PeerMsg::Conversion { .. } => "conversion",
            PeerMsg::GameOver { .. } => "game_over",
            PeerMsg::PlayerLeft {} => "player_left",
            PeerMsg::StartMatch { .. } => "start_match",
            PeerMsg::PlacementMove { .. } => "placement_move",
        }
    }
}

/// A message plus the id of the peer that sent it, as stamped by the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: String,
    #[serde(flatten)]
    pub msg: PeerMsg,
}

impl Envelope {
    pub fn new(from: impl Into<String>, msg: PeerMsg) -> Self {
        Self { from: from.into(), msg }
    }
}

/// Roster entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub id: String,
    pub username: String,
    pub faction: Faction,
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateMsg {
    pub armies: BTreeMap<Faction, ArmySnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<MatchPhase>,
    #[serde(default)]
    pub placement_remaining: f32,
    #[serde(default)]
    pub power_ups: Vec<PowerUpSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmySnapshot {
    /// Authoritative roster order; the first entry leads
    pub soldiers: Vec<SoldierSnapshot>,
    pub is_invincible: bool,
    pub speed_multiplier: f32,
    #[serde(default)]
    pub is_reversed: bool,
    #[serde(default)]
    pub has_magnet: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoldierSnapshot {
    pub id: String,
    pub x: f32,
    pub z: f32,
    pub is_leader: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerUpSnapshot {
    pub id: u32,
    pub kind: PowerUpKind,
    pub x: f32,
    pub z: f32,
}

/// Serialize a bare message (outbound, before the relay stamps it)
pub fn encode(msg: &PeerMsg) -> Result<String, NetError> {
    Ok(serde_json::to_string(msg)?)
}

/// Parse a relayed message
pub fn decode_envelope(text: &str) -> Result<Envelope, NetError> {
    Ok(serde_json::from_str(text)?)
}
