//! Party channels on the relay: one broadcast channel per party code

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

const PARTY_CHANNEL_CAPACITY: usize = 256;

/// A message on its way to every other member of a party
#[derive(Debug, Clone)]
pub struct RelayFrame {
    /// Sender; the sender's own writer skips the frame
    pub from: String,
    /// Stamped JSON text
    pub text: Arc<str>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PartyError {
    #[error("party {0} is full")]
    Full(String),
    #[error("{0} is already connected")]
    AlreadyConnected(String),
}

/// Handle returned on join
#[derive(Clone)]
pub struct PartyHandle {
    pub code: String,
    pub tx: broadcast::Sender<RelayFrame>,
}

struct Party {
    tx: broadcast::Sender<RelayFrame>,
    members: Vec<String>,
}

/// Registry of live parties
pub struct PartyRegistry {
    parties: DashMap<String, Party>,
    max_peers: usize,
}

impl PartyRegistry {
    pub fn new(max_peers: usize) -> Self {
        Self {
            parties: DashMap::new(),
            max_peers: max_peers.max(1),
        }
    }

    /// Add a member, creating the party on first join
    pub fn join(
        &self,
        code: &str,
        user_id: &str,
    ) -> Result<(PartyHandle, broadcast::Receiver<RelayFrame>), PartyError> {
        let mut party = self.parties.entry(code.to_string()).or_insert_with(|| {
            info!(party = %code, "Party opened");
            let (tx, _) = broadcast::channel(PARTY_CHANNEL_CAPACITY);
            Party { tx, members: Vec::new() }
        });
        if party.members.iter().any(|m| m == user_id) {
            return Err(PartyError::AlreadyConnected(user_id.to_string()));
        }
        if party.members.len() >= self.max_peers {
            return Err(PartyError::Full(code.to_string()));
        }
        party.members.push(user_id.to_string());
        let rx = party.tx.subscribe();
        Ok((PartyHandle { code: code.to_string(), tx: party.tx.clone() }, rx))
    }

    /// Remove a member; the last one out closes the party
    pub fn leave(&self, code: &str, user_id: &str) {
        let empty = match self.parties.get_mut(code) {
            Some(mut party) => {
                party.members.retain(|m| m != user_id);
                party.members.is_empty()
            }
            None => return,
        };
        if empty && self.parties.remove_if(code, |_, p| p.members.is_empty()).is_some() {
            info!(party = %code, "Party closed");
        }
    }

    pub fn has_room(&self, code: &str) -> bool {
        self.parties.get(code).map_or(true, |p| p.members.len() < self.max_peers)
    }

    pub fn active_parties(&self) -> usize {
        self.parties.len()
    }

    pub fn total_peers(&self) -> usize {
        self.parties.iter().map(|p| p.value().members.len()).sum()
    }
}

impl Default for PartyRegistry {
    fn default() -> Self {
        Self::new(8)
    }
}
