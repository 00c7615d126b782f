//! Party session: roster, faction assignment and message dispatch.
//!
//! The session only touches plain buffered state (roster, remote inputs,
//! outbox). Anything that mutates the match is surfaced as a
//! `SessionEvent` for the runtime to apply between ticks.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::collab::Identity;
use crate::game::{Faction, Vec2};

use super::protocol::{Envelope, GameStateMsg, PeerMsg, PlayerInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Client,
}

/// Roster slot as the UI shows it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Connected,
    Disconnected,
    Empty,
}

/// Something the runtime has to act on
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// We were given a faction by the host
    Assigned(Faction),
    /// Roster contents changed
    RosterChanged,
    /// A peer joined (host side)
    PlayerJoined { id: String, faction: Faction },
    /// The host refused us
    PartyFull,
    MatchStarted { seed: u64 },
    StateReceived(Box<GameStateMsg>),
    Conversion { soldier_id: String, from: Faction, to: Faction },
    GameOver { winner: Option<Faction> },
    /// Host side: a client dragged a soldier
    PlacementMove { faction: Faction, soldier_id: String, position: Vec2 },
    PlayerLeft { id: String, faction: Option<Faction> },
    /// The authority is gone; the match cannot continue
    HostLost,
}

pub struct NetworkSession {
    pub role: Role,
    pub local_id: String,
    pub username: String,
    pub party_code: String,
    pub local_faction: Option<Faction>,
    pub host_id: Option<String>,
    pub players: Vec<PlayerInfo>,
    /// Last movement vector received per remote faction
    pub remote_inputs: BTreeMap<Faction, Vec2>,
    outbox: Vec<PeerMsg>,
}

impl NetworkSession {
    /// Create a party. The host always plays Rock.
    pub fn host(identity: &Identity, party_code: impl Into<String>) -> Self {
        let party_code = party_code.into();
        info!(party = %party_code, user_id = %identity.user_id, "Hosting party");
        Self {
            role: Role::Host,
            local_id: identity.user_id.clone(),
            username: identity.username.clone(),
            party_code,
            local_faction: Some(Faction::Rock),
            host_id: Some(identity.user_id.clone()),
            players: vec![PlayerInfo {
                id: identity.user_id.clone(),
                username: identity.username.clone(),
                faction: Faction::Rock,
                connected: true,
            }],
            remote_inputs: BTreeMap::new(),
            outbox: Vec::new(),
        }
    }

    /// Join a party; queues the join request
    pub fn join(identity: &Identity, party_code: impl Into<String>) -> Self {
        let party_code = party_code.into();
        info!(party = %party_code, user_id = %identity.user_id, "Joining party");
        Self {
            role: Role::Client,
            local_id: identity.user_id.clone(),
            username: identity.username.clone(),
            party_code,
            local_faction: None,
            host_id: None,
            players: Vec::new(),
            remote_inputs: BTreeMap::new(),
            outbox: vec![PeerMsg::JoinRequest {
                id: identity.user_id.clone(),
                username: identity.username.clone(),
            }],
        }
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    pub fn queue(&mut self, msg: PeerMsg) {
        self.outbox.push(msg);
    }

    pub fn drain_outbox(&mut self) -> Vec<PeerMsg> {
        std::mem::take(&mut self.outbox)
    }

    pub fn slot(&self, faction: Faction) -> SlotStatus {
        match self.players.iter().find(|p| p.faction == faction) {
            Some(p) if p.connected => SlotStatus::Connected,
            Some(_) => SlotStatus::Disconnected,
            None => SlotStatus::Empty,
        }
    }

    pub fn roster_status(&self) -> BTreeMap<Faction, SlotStatus> {
        Faction::ALL.iter().map(|&f| (f, self.slot(f))).collect()
    }

    pub fn connected_players(&self) -> usize {
        self.players.iter().filter(|p| p.connected).count()
    }

    fn faction_of(&self, user_id: &str) -> Option<Faction> {
        self.players.iter().find(|p| p.id == user_id).map(|p| p.faction)
    }

    /// Dispatch one inbound message
    pub fn handle(&mut self, envelope: Envelope) -> Vec<SessionEvent> {
        let Envelope { from, msg } = envelope;
        if from == self.local_id {
            return Vec::new();
        }

        match (self.role, msg) {
            (Role::Host, PeerMsg::JoinRequest { id, username }) => self.admit(id, username),
            (Role::Host, PeerMsg::PlayerInput { faction, x, z }) => {
                if self.faction_of(&from) != Some(faction) {
                    debug!(from = %from, faction = %faction, "Input for a faction not owned");
                    return Vec::new();
                }
                self.remote_inputs.insert(faction, Vec2::new(x, z).clamp_length(1.0));
                Vec::new()
            }
            (Role::Host, PeerMsg::PlacementMove { faction, soldier_id, x, z }) => {
                if self.faction_of(&from) != Some(faction) {
                    debug!(from = %from, faction = %faction, "Placement for a faction not owned");
                    return Vec::new();
                }
                vec![SessionEvent::PlacementMove { faction, soldier_id, position: Vec2::new(x, z) }]
            }

            (Role::Client, PeerMsg::PlayerAssigned { target_id, faction, players }) => {
                if target_id != self.local_id || !self.may_be_host(&from) {
                    return Vec::new();
                }
                info!(party = %self.party_code, faction = %faction, "Assigned faction");
                self.local_faction = Some(faction);
                self.host_id = Some(from);
                self.players = players;
                vec![SessionEvent::Assigned(faction), SessionEvent::RosterChanged]
            }
            (Role::Client, PeerMsg::PlayerJoined { players, .. }) => {
                if !self.may_be_host(&from) {
                    debug!(from = %from, "Ignoring roster from non-host peer");
                    return Vec::new();
                }
                self.players = players;
                vec![SessionEvent::RosterChanged]
            }
            (Role::Client, PeerMsg::PartyFull { target_id }) => {
                if target_id != self.local_id || self.local_faction.is_some() {
                    return Vec::new();
                }
                warn!(party = %self.party_code, "Party is full");
                vec![SessionEvent::PartyFull]
            }
            (_, PeerMsg::PlayerLeft {}) => self.player_left(&from),

            (Role::Client, msg) if !self.from_host(&from) => {
                debug!(from = %from, kind = msg.kind(), "Ignoring message from non-host peer");
                Vec::new()
            }
            (Role::Client, PeerMsg::GameState(state)) => {
                vec![SessionEvent::StateReceived(Box::new(state))]
            }
            (Role::Client, PeerMsg::Conversion { soldier_id, from_faction, to_faction }) => {
                vec![SessionEvent::Conversion { soldier_id, from: from_faction, to: to_faction }]
            }
            (Role::Client, PeerMsg::GameOver { winner }) => vec![SessionEvent::GameOver { winner }],
            (Role::Client, PeerMsg::StartMatch { players, seed }) => {
                self.players = players;
                vec![SessionEvent::RosterChanged, SessionEvent::MatchStarted { seed }]
            }

            (role, msg) => {
                debug!(role = ?role, from = %from, kind = msg.kind(), "Message not handled");
                Vec::new()
            }
        }
    }

    /// Only the assigned host is trusted for state; before assignment
    /// nothing is.
    fn from_host(&self, from: &str) -> bool {
        self.host_id.as_deref() == Some(from)
    }

    /// Before assignment any peer may be the host; afterwards only the recorded one
    fn may_be_host(&self, from: &str) -> bool {
        self.host_id.as_deref().map_or(true, |host| host == from)
    }

    fn admit(&mut self, id: String, username: String) -> Vec<SessionEvent> {
        // Rejoin keeps the old slot
        let faction = match self.players.iter().position(|p| p.id == id) {
            Some(idx) => {
                let existing = &mut self.players[idx];
                existing.connected = true;
                existing.username = username;
                Some(existing.faction)
            }
            None => {
                let free = Faction::JOIN_ORDER
                    .into_iter()
                    .find(|f| !self.players.iter().any(|p| p.faction == *f));
                if let Some(faction) = free {
                    self.players.push(PlayerInfo {
                        id: id.clone(),
                        username,
                        faction,
                        connected: true,
                    });
                }
                free
            }
        };

        let Some(faction) = faction else {
            info!(party = %self.party_code, user_id = %id, "Rejecting join, party full");
            self.queue(PeerMsg::PartyFull { target_id: id });
            return Vec::new();
        };

        info!(party = %self.party_code, user_id = %id, faction = %faction, "Player joined");
        self.queue(PeerMsg::PlayerAssigned {
            target_id: id.clone(),
            faction,
            players: self.players.clone(),
        });
        self.queue(PeerMsg::PlayerJoined { faction, players: self.players.clone() });
        vec![SessionEvent::PlayerJoined { id, faction }, SessionEvent::RosterChanged]
    }

    fn player_left(&mut self, id: &str) -> Vec<SessionEvent> {
        if self.role == Role::Client && self.from_host(id) {
            warn!(party = %self.party_code, host = %id, "Host left the party");
            return vec![SessionEvent::HostLost];
        }
        let Some(player) = self.players.iter_mut().find(|p| p.id == id) else {
            return Vec::new();
        };
        player.connected = false;
        let faction = player.faction;
        self.remote_inputs.remove(&faction);
        info!(party = %self.party_code, user_id = %id, faction = %faction, "Player left");
        vec![
            SessionEvent::PlayerLeft { id: id.to_string(), faction: Some(faction) },
            SessionEvent::RosterChanged,
        ]
    }

    /// The link to the party dropped. For a client that is the host.
    pub fn on_transport_closed(&mut self) -> Vec<SessionEvent> {
        warn!(party = %self.party_code, role = ?self.role, "Party transport closed");
        for player in self.players.iter_mut().filter(|p| p.id != self.local_id) {
            player.connected = false;
        }
        self.remote_inputs.clear();
        vec![SessionEvent::HostLost]
    }

    /// Snapshots are applied only by mirrors, never by the authority
    pub fn accepts_state(&self) -> bool {
        !self.is_host()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: &str) -> Identity {
        Identity::new(id, format!("name-{id}")).unwrap()
    }

    fn deliver(to: &mut NetworkSession, from: &str, msg: PeerMsg) -> Vec<SessionEvent> {
        to.handle(Envelope::new(from, msg))
    }

    /// Hand each queued message of `from` to `to`
    fn pump(from: &mut NetworkSession, to: &mut NetworkSession) -> Vec<SessionEvent> {
        let sender = from.local_id.clone();
        from.drain_outbox()
            .into_iter()
            .flat_map(|msg| deliver(to, &sender, msg))
            .collect()
    }

    #[test]
    fn test_joiners_get_paper_then_scissors_then_full() {
        let mut host = NetworkSession::host(&identity("h"), "ABCDEF");
        let mut a = NetworkSession::join(&identity("a"), "ABCDEF");
        let mut b = NetworkSession::join(&identity("b"), "ABCDEF");
        let mut c = NetworkSession::join(&identity("c"), "ABCDEF");

        pump(&mut a, &mut host);
        let to_a = host.drain_outbox();
        assert!(matches!(
            &to_a[0],
            PeerMsg::PlayerAssigned { target_id, faction: Faction::Paper, .. } if target_id == "a"
        ));
        pump(&mut b, &mut host);
        let to_b = host.drain_outbox();
        assert!(matches!(&to_b[0], PeerMsg::PlayerAssigned { faction: Faction::Scissors, .. }));

        pump(&mut c, &mut host);
        assert_eq!(host.drain_outbox(), vec![PeerMsg::PartyFull { target_id: "c".into() }]);
        assert_eq!(
            deliver(&mut c, "h", PeerMsg::PartyFull { target_id: "c".into() }),
            vec![SessionEvent::PartyFull]
        );
        assert_eq!(host.players.len(), 3);
    }

    #[test]
    fn test_roster_only_from_recorded_host() {
        let mut host = NetworkSession::host(&identity("h"), "ABCDEF");
        let mut joiner = NetworkSession::join(&identity("j"), "ABCDEF");
        pump(&mut joiner, &mut host);
        pump(&mut host, &mut joiner);
        let roster = joiner.players.clone();
        assert_eq!(joiner.host_id.as_deref(), Some("h"));

        let forged = vec![PlayerInfo {
            id: "m".into(),
            username: "mallory".into(),
            faction: Faction::Rock,
            connected: true,
        }];
        let joined = PeerMsg::PlayerJoined { faction: Faction::Scissors, players: forged.clone() };
        assert!(deliver(&mut joiner, "m", joined).is_empty());
        let assigned = PeerMsg::PlayerAssigned {
            target_id: "j".into(),
            faction: Faction::Scissors,
            players: forged,
        };
        assert!(deliver(&mut joiner, "m", assigned).is_empty());

        assert_eq!(joiner.players, roster);
        assert_eq!(joiner.host_id.as_deref(), Some("h"));
        assert_eq!(joiner.local_faction, Some(Faction::Paper));
    }

    #[test]
    fn test_assignment_adopts_roster_and_host() {
        let mut host = NetworkSession::host(&identity("h"), "ABCDEF");
        let mut joiner = NetworkSession::join(&identity("j"), "ABCDEF");
        pump(&mut joiner, &mut host);
        let events = pump(&mut host, &mut joiner);
        assert!(events.contains(&SessionEvent::Assigned(Faction::Paper)));
        assert_eq!(joiner.local_faction, Some(Faction::Paper));
        assert_eq!(joiner.host_id.as_deref(), Some("h"));
        let expected = BTreeMap::from([
            (Faction::Rock, SlotStatus::Connected),
            (Faction::Paper, SlotStatus::Connected),
            (Faction::Scissors, SlotStatus::Empty),
        ]);
        assert_eq!(joiner.roster_status(), expected);
        assert_eq!(host.roster_status(), expected);
    }

    #[test]
    fn test_input_is_last_write_wins_and_owner_checked() {
        let mut host = NetworkSession::host(&identity("h"), "ABCDEF");
        let mut joiner = NetworkSession::join(&identity("j"), "ABCDEF");
        pump(&mut joiner, &mut host);

        deliver(&mut host, "j", PeerMsg::PlayerInput { faction: Faction::Paper, x: 1.0, z: 0.0 });
        deliver(&mut host, "j", PeerMsg::PlayerInput { faction: Faction::Paper, x: 0.0, z: -1.0 });
        assert_eq!(host.remote_inputs[&Faction::Paper], Vec2::new(0.0, -1.0));

        deliver(&mut host, "j", PeerMsg::PlayerInput { faction: Faction::Rock, x: 1.0, z: 0.0 });
        assert!(!host.remote_inputs.contains_key(&Faction::Rock));
    }

    #[test]
    fn test_rejoin_keeps_slot() {
        let mut host = NetworkSession::host(&identity("h"), "ABCDEF");
        deliver(&mut host, "j", PeerMsg::JoinRequest { id: "j".into(), username: "j".into() });
        deliver(&mut host, "j", PeerMsg::PlayerLeft {});
        assert_eq!(host.slot(Faction::Paper), SlotStatus::Disconnected);
        host.drain_outbox();

        let rejoin = PeerMsg::JoinRequest { id: "j".into(), username: "j".into() };
        let events = deliver(&mut host, "j", rejoin);
        let joined = SessionEvent::PlayerJoined { id: "j".into(), faction: Faction::Paper };
        assert!(events.contains(&joined));
        assert_eq!(host.slot(Faction::Paper), SlotStatus::Connected);
        assert_eq!(host.slot(Faction::Scissors), SlotStatus::Empty);
    }

    #[test]
    fn test_client_ignores_state_from_non_host() {
        let mut joiner = NetworkSession::join(&identity("j"), "ABCDEF");
        assert!(deliver(&mut joiner, "x", PeerMsg::GameOver { winner: None }).is_empty());
        joiner.host_id = Some("h".into());
        assert_eq!(
            deliver(&mut joiner, "h", PeerMsg::GameOver { winner: Some(Faction::Rock) }),
            vec![SessionEvent::GameOver { winner: Some(Faction::Rock) }]
        );
    }

    #[test]
    fn test_host_ignores_mirror_messages() {
        let mut host = NetworkSession::host(&identity("h"), "ABCDEF");
        let events = deliver(
            &mut host,
            "j",
            PeerMsg::Conversion {
                soldier_id: "rock-0".into(),
                from_faction: Faction::Rock,
                to_faction: Faction::Paper,
            },
        );
        assert!(events.is_empty());
        assert!(!host.accepts_state());
    }

    #[test]
    fn test_host_leaving_is_host_lost() {
        let mut joiner = NetworkSession::join(&identity("j"), "ABCDEF");
        joiner.host_id = Some("h".into());
        assert_eq!(deliver(&mut joiner, "h", PeerMsg::PlayerLeft {}), vec![SessionEvent::HostLost]);
        assert_eq!(joiner.on_transport_closed(), vec![SessionEvent::HostLost]);
    }
}
