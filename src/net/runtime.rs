//! Per-peer loop: drains the transport into buffered state, ticks the
//! simulation (authority only), paces outbound sync and feeds the
//! collaborators.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::future::Future;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::collab::{Collaborators, SoundCue};
use crate::config::SimConfig;
use crate::game::conversion::ConversionSystem;
use crate::game::view::RenderView;
use crate::game::{Faction, GameEvent, MatchOutcome, MatchPhase, MatchState, SimError, Vec2};
use crate::util::time::{ticks_per_send, tick_duration, INPUT_SEND_TPS, SYNC_TPS};

use super::protocol::{encode, PeerMsg};
use super::reconcile::apply_game_state;
use super::session::{NetworkSession, SessionEvent};
use super::snapshot::{SnapshotBuilder, SnapshotStats};
use super::transport::{PeerTransport, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// Local authority with AI opponents, no network
    Solo,
    /// Authority for a party
    Host,
    /// Mirror of the host
    Client,
}

/// Why a peer loop stopped
#[derive(Debug, Clone, PartialEq)]
pub enum RunEnd {
    Completed(MatchOutcome),
    /// Host gone or relay link lost
    Disconnected,
    /// Host answered party_full
    Rejected,
    Shutdown,
}

pub struct PeerRuntime {
    role: PeerRole,
    pub state: MatchState,
    session: Option<NetworkSession>,
    transport: Option<PeerTransport>,
    collab: Collaborators,
    snapshots: SnapshotBuilder,
    stats: SnapshotStats,
    input_every: u32,
    ticks_since_input: u32,
    /// Host waits for this many connected players before starting
    min_players: usize,
    seed_rng: ChaCha8Rng,
    /// Events produced while applying inbound messages, reported with the next step
    pending: Vec<GameEvent>,
    finished: Option<RunEnd>,
}

impl PeerRuntime {
    fn new(
        role: PeerRole,
        sim: SimConfig,
        seed: u64,
        session: Option<NetworkSession>,
        transport: Option<PeerTransport>,
        collab: Collaborators,
    ) -> Self {
        let mut state = MatchState::new(sim, seed);
        state.local_faction = session.as_ref().and_then(|s| s.local_faction);
        Self {
            role,
            state,
            session,
            transport,
            collab,
            snapshots: SnapshotBuilder::new(ticks_per_send(SYNC_TPS)),
            stats: SnapshotStats::default(),
            input_every: ticks_per_send(INPUT_SEND_TPS),
            ticks_since_input: 0,
            min_players: 1,
            seed_rng: ChaCha8Rng::seed_from_u64(seed),
            pending: Vec::new(),
            finished: None,
        }
    }

    /// Local match against two AI armies; the player is Rock
    pub fn solo(sim: SimConfig, seed: u64, collab: Collaborators) -> Result<Self, SimError> {
        let mut runtime = Self::new(PeerRole::Solo, sim, seed, None, None, collab);
        runtime
            .state
            .start_placement(Some(Faction::Rock), true, [Faction::Paper, Faction::Scissors])?;
        Ok(runtime)
    }

    pub fn host(
        session: NetworkSession,
        transport: PeerTransport,
        sim: SimConfig,
        seed: u64,
        min_players: usize,
        collab: Collaborators,
    ) -> Self {
        let mut runtime =
            Self::new(PeerRole::Host, sim, seed, Some(session), Some(transport), collab);
        runtime.min_players = min_players.max(1);
        runtime
    }

    pub fn client(
        session: NetworkSession,
        transport: PeerTransport,
        sim: SimConfig,
        seed: u64,
        collab: Collaborators,
    ) -> Self {
        Self::new(PeerRole::Client, sim, seed, Some(session), Some(transport), collab)
    }

    pub fn session(&self) -> Option<&NetworkSession> {
        self.session.as_ref()
    }

    pub fn finished(&self) -> Option<&RunEnd> {
        self.finished.as_ref()
    }

    fn is_authority(&self) -> bool {
        matches!(self.role, PeerRole::Solo | PeerRole::Host)
    }

    /// Host: start (or restart) a match for the current roster
    pub fn start_match(&mut self) -> Result<(), SimError> {
        let seed: u64 = self.seed_rng.gen();
        self.state.reseed(seed);
        let local = self.state.local_faction;
        self.state.start_placement(local, false, [])?;
        if let Some(session) = self.session.as_mut() {
            let players = session.players.clone();
            info!(party = %session.party_code, players = players.len(), seed, "Starting match");
            session.queue(PeerMsg::StartMatch { players, seed });
        }
        self.snapshots.force_next();
        Ok(())
    }

    /// Drag one of our soldiers during placement. Clients apply it locally
    /// and forward it to the host.
    pub fn drag_local(&mut self, soldier_id: &str, position: Vec2) -> bool {
        let Some(faction) = self.state.local_faction else {
            return false;
        };
        if !self.state.place_soldier(faction, soldier_id, position) {
            self.collab.audio.play(SoundCue::Error);
            return false;
        }
        if self.role == PeerRole::Client {
            if let Some(session) = self.session.as_mut() {
                session.queue(PeerMsg::PlacementMove {
                    faction,
                    soldier_id: soldier_id.to_string(),
                    x: position.x,
                    z: position.z,
                });
            }
        }
        true
    }

    /// One frame
    pub fn step(&mut self) -> Vec<GameEvent> {
        self.pump_inbound();
        if self.finished.is_some() {
            self.flush_outbox();
            return std::mem::take(&mut self.pending);
        }

        if self.role == PeerRole::Host && self.state.phase == MatchPhase::Menu {
            let ready = self
                .session
                .as_ref()
                .is_some_and(|s| s.connected_players() >= self.min_players);
            if ready {
                if let Err(e) = self.start_match() {
                    error!(error = %e, "Could not start match");
                }
            }
        }

        let input = self.collab.input.movement(&self.state);
        let mut events = std::mem::take(&mut self.pending);
        if self.is_authority() {
            let no_remote = BTreeMap::new();
            let remote = self.session.as_ref().map_or(&no_remote, |s| &s.remote_inputs);
            events.extend(self.state.tick(input, remote));
            self.publish(&events);
        } else {
            self.send_input(input);
            events.extend(self.state.advance_mirror());
        }

        self.play_cues(&events);
        self.flush_outbox();
        self.collab.presenter.present(&RenderView::capture(&self.state));

        if self.state.phase == MatchPhase::Ended && self.finished.is_none() {
            if let Some(outcome) = self.state.outcome {
                self.finished = Some(RunEnd::Completed(outcome));
            }
        }
        events
    }

    fn pump_inbound(&mut self) {
        let mut session_events = Vec::new();
        if let Some(transport) = self.transport.as_mut() {
            while let Some(event) = transport.try_recv() {
                let Some(session) = self.session.as_mut() else {
                    continue;
                };
                match event {
                    TransportEvent::Message(envelope) => {
                        session_events.extend(session.handle(envelope))
                    }
                    TransportEvent::Closed => {
                        session_events.extend(session.on_transport_closed())
                    }
                }
            }
        }
        for event in session_events {
            self.apply(event);
        }
    }

    fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Assigned(faction) => {
                self.state.local_faction = Some(faction);
                self.collab.audio.play(SoundCue::Click);
            }
            SessionEvent::RosterChanged => {
                if let Some(session) = &self.session {
                    debug!(
                        party = %session.party_code,
                        roster = ?session.roster_status(),
                        "Roster changed"
                    );
                }
            }
            SessionEvent::PlayerJoined { .. } => {
                // Late joiners pick the match up from the next snapshot
                self.snapshots.force_next();
            }
            SessionEvent::PartyFull => {
                self.state.abort();
                self.collab.audio.play(SoundCue::Error);
                self.finished = Some(RunEnd::Rejected);
            }
            SessionEvent::MatchStarted { seed } => {
                if self.state.phase != MatchPhase::Menu && self.state.phase != MatchPhase::Ended {
                    self.state.abort();
                }
                self.state.reseed(seed);
                let local = self.state.local_faction;
                match self.state.start_placement(local, false, []) {
                    Ok(events) => self.pending.extend(events),
                    Err(e) => warn!(error = %e, "Ignoring start_match"),
                }
            }
            SessionEvent::StateReceived(msg) => {
                if !self.session.as_ref().is_some_and(|s| s.accepts_state()) {
                    return;
                }
                let lerp = self.state.config.reconcile_lerp;
                let Some(phase) = msg.phase else {
                    if matches!(self.state.phase, MatchPhase::Placement | MatchPhase::Playing) {
                        apply_game_state(&mut self.state, &msg, lerp);
                    }
                    return;
                };
                let in_progress = matches!(phase, MatchPhase::Placement | MatchPhase::Playing);
                if self.state.phase == MatchPhase::Menu && in_progress {
                    let local = self.state.local_faction;
                    if let Ok(events) = self.state.start_placement(local, false, []) {
                        info!(phase = ?phase, "Joining match in progress");
                        self.pending.extend(events);
                    }
                }
                let events = self.state.mirror_phase(phase);
                self.pending.extend(events);
                if matches!(self.state.phase, MatchPhase::Placement | MatchPhase::Playing) {
                    apply_game_state(&mut self.state, &msg, lerp);
                }
            }
            SessionEvent::Conversion { soldier_id, from, to } => {
                if ConversionSystem::apply_remote(&mut self.state.armies, &soldier_id, from, to) {
                    self.pending.push(GameEvent::Converted { soldier_id, from, to });
                } else {
                    debug!(soldier_id = %soldier_id, "Conversion already applied or unknown");
                }
            }
            SessionEvent::GameOver { winner } => {
                let events = self.state.force_end(winner);
                self.pending.extend(events);
            }
            SessionEvent::PlacementMove { faction, soldier_id, position } => {
                if !self.state.place_soldier(faction, &soldier_id, position) {
                    debug!(faction = %faction, soldier_id = %soldier_id, "Rejected placement move");
                }
            }
            SessionEvent::PlayerLeft { id, faction } => {
                debug!(user_id = %id, faction = ?faction, "Peer left");
            }
            SessionEvent::HostLost => {
                info!(role = ?self.role, "Lost the party, returning to menu");
                self.state.abort();
                self.collab.audio.play(SoundCue::Error);
                self.finished = Some(RunEnd::Disconnected);
            }
        }
    }

    /// Authority: turn this tick's events and state into outbound messages.
    /// Conversions go first and game_over last so the final snapshot lands
    /// before it.
    fn publish(&mut self, events: &[GameEvent]) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let mut game_over = None;
        for event in events {
            match event {
                GameEvent::Converted { soldier_id, from, to } => session.queue(PeerMsg::Conversion {
                    soldier_id: soldier_id.clone(),
                    from_faction: *from,
                    to_faction: *to,
                }),
                GameEvent::PhaseChanged { .. } => self.snapshots.force_next(),
                GameEvent::MatchEnded { winner } => {
                    self.snapshots.force_next();
                    game_over = Some(PeerMsg::GameOver { winner: *winner });
                }
                _ => {}
            }
        }

        if self.state.phase != MatchPhase::Menu && self.snapshots.should_send() {
            let msg = self.snapshots.build(&self.state);
            let soldiers = self.state.armies.values().map(|a| a.len()).sum();
            self.stats.record(soldiers, encode(&msg).map_or(0, |text| text.len()));
            session.queue(msg);
        }

        if let Some(msg) = game_over {
            session.queue(msg);
        }
    }

    /// Client: throttled movement upload
    fn send_input(&mut self, input: Vec2) {
        if self.state.phase != MatchPhase::Playing {
            self.ticks_since_input = 0;
            return;
        }
        let (Some(faction), Some(session)) = (self.state.local_faction, self.session.as_mut())
        else {
            return;
        };
        self.ticks_since_input += 1;
        if self.ticks_since_input < self.input_every {
            return;
        }
        self.ticks_since_input = 0;
        session.queue(PeerMsg::PlayerInput { faction, x: input.x, z: input.z });
    }

    fn flush_outbox(&mut self) {
        let (Some(session), Some(transport)) = (self.session.as_mut(), self.transport.as_ref())
        else {
            return;
        };
        for msg in session.drain_outbox() {
            let kind = msg.kind();
            if let Err(e) = transport.send(msg) {
                warn!(peer = %transport.local_id(), kind, error = %e, "Dropping outbound message");
            }
        }
    }

    fn play_cues(&mut self, events: &[GameEvent]) {
        for event in events {
            let cue = match event {
                GameEvent::Converted { .. } => SoundCue::Convert,
                GameEvent::PowerUpCollected { .. } => SoundCue::PowerUp,
                GameEvent::CountdownTick { .. } => SoundCue::CountdownTick,
                GameEvent::MatchEnded { winner }
                    if winner.is_some() && *winner == self.state.local_faction =>
                {
                    SoundCue::Victory
                }
                _ => continue,
            };
            self.collab.audio.play(cue);
        }
    }

    /// Drive `step` at the simulation rate until the match is decided, the
    /// party is lost, or `shutdown` resolves.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> RunEnd {
        info!(role = ?self.role, "Peer loop started");

        let mut tick_interval = interval(tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let end = loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    self.step();
                    if let Some(end) = self.finished.take() {
                        break end;
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break RunEnd::Shutdown;
                }
            }
        };

        info!(
            role = ?self.role,
            end = ?end,
            snapshots = self.stats.total_snapshots,
            "Peer loop finished"
        );
        self.flush_outbox();
        if let Some(transport) = self.transport.take() {
            transport.close().await;
        }
        self.collab.teardown();
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{AudioSink, HeldDirections, Identity, LogAudio, LogPresenter};
    use crate::game::Soldier;
    use crate::net::session::SlotStatus;
    use crate::net::transport::LocalHub;
    use crate::util::party_code;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingAudio(Arc<Mutex<Vec<SoundCue>>>);

    impl AudioSink for RecordingAudio {
        fn play(&mut self, cue: SoundCue) {
            self.0.lock().unwrap().push(cue);
        }
    }

    fn collab(id: &str, held: HeldDirections) -> Collaborators {
        Collaborators::init(
            Identity::new(id, id).unwrap(),
            Box::new(LogAudio),
            Box::new(held),
            Box::new(LogPresenter::default()),
        )
    }

    fn quick_sim() -> SimConfig {
        SimConfig { placement_secs: 0.1, ..SimConfig::default() }
    }

    fn host_on(hub: &LocalHub, code: &str, min_players: usize) -> PeerRuntime {
        let c = collab("host", HeldDirections::default());
        let session = NetworkSession::host(&c.identity, code);
        PeerRuntime::host(session, hub.connect("host"), quick_sim(), 7, min_players, c)
    }

    fn client_on(hub: &LocalHub, code: &str, id: &str, held: HeldDirections) -> PeerRuntime {
        let c = collab(id, held);
        let session = NetworkSession::join(&c.identity, code);
        PeerRuntime::client(session, hub.connect(id), quick_sim(), 7, c)
    }

    fn step_both(host: &mut PeerRuntime, client: &mut PeerRuntime, ticks: usize) {
        for _ in 0..ticks {
            client.step();
            host.step();
        }
    }

    #[tokio::test]
    async fn test_party_join_scenario() {
        let code = party_code::generate(&mut ChaCha8Rng::seed_from_u64(1));
        assert_eq!(code.len(), 6);
        assert!(party_code::is_valid(&code));
        assert_eq!(code, code.to_uppercase());

        let hub = LocalHub::new();
        let mut host = host_on(&hub, &code, 2);
        let mut client = client_on(&hub, &code, "guest", HeldDirections::default());

        host.step();
        assert_eq!(host.state.phase, MatchPhase::Menu);
        step_both(&mut host, &mut client, 1);
        client.step();

        assert_eq!(client.state.local_faction, Some(Faction::Paper));
        let expected = BTreeMap::from([
            (Faction::Rock, SlotStatus::Connected),
            (Faction::Paper, SlotStatus::Connected),
            (Faction::Scissors, SlotStatus::Empty),
        ]);
        assert_eq!(host.session().unwrap().roster_status(), expected);
        assert_eq!(client.session().unwrap().roster_status(), expected);
        assert_eq!(host.state.phase, MatchPhase::Placement);
        assert_eq!(client.state.phase, MatchPhase::Placement);
        assert_eq!(client.state.counts(), host.state.counts());
    }

    #[tokio::test]
    async fn test_fourth_peer_rejected() {
        let hub = LocalHub::new();
        let mut host = host_on(&hub, "ABCDEF", 4);
        let mut peers: Vec<PeerRuntime> = ["a", "b", "c"]
            .iter()
            .map(|id| client_on(&hub, "ABCDEF", id, HeldDirections::default()))
            .collect();
        for peer in peers.iter_mut() {
            peer.step();
        }
        host.step();
        for peer in peers.iter_mut() {
            peer.step();
        }
        assert_eq!(peers[0].state.local_faction, Some(Faction::Paper));
        assert_eq!(peers[1].state.local_faction, Some(Faction::Scissors));
        assert_eq!(peers[2].finished(), Some(&RunEnd::Rejected));
        assert_eq!(peers[2].state.phase, MatchPhase::Menu);
    }

    #[tokio::test]
    async fn test_host_loss_returns_client_to_menu() {
        let hub = LocalHub::new();
        let mut host = host_on(&hub, "ABCDEF", 2);
        let mut client = client_on(&hub, "ABCDEF", "guest", HeldDirections::default());
        step_both(&mut host, &mut client, 20);
        assert_eq!(client.state.phase, MatchPhase::Playing);

        hub.disconnect("host");
        client.step();
        assert_eq!(client.state.phase, MatchPhase::Menu);
        assert_eq!(client.finished(), Some(&RunEnd::Disconnected));
        assert!(client.state.armies.values().all(|a| a.is_eliminated()));

        host.step();
        assert_eq!(host.finished(), Some(&RunEnd::Disconnected));
    }

    #[tokio::test]
    async fn test_client_input_reaches_host_and_state_comes_back() {
        let hub = LocalHub::new();
        let mut host = host_on(&hub, "ABCDEF", 2);
        let right = HeldDirections { right: true, ..Default::default() };
        let mut client = client_on(&hub, "ABCDEF", "guest", right);
        step_both(&mut host, &mut client, 20);
        assert_eq!(host.state.phase, MatchPhase::Playing);
        let start = host.state.armies[&Faction::Paper].leader_position().unwrap();

        step_both(&mut host, &mut client, 30);
        assert_eq!(host.session().unwrap().remote_inputs[&Faction::Paper], Vec2::new(1.0, 0.0));
        let host_pos = host.state.armies[&Faction::Paper].leader_position().unwrap();
        assert!(host_pos.x > start.x);
        let client_pos = client.state.armies[&Faction::Paper].leader_position().unwrap();
        assert!(client_pos.x > start.x);
        assert!(client_pos.distance(host_pos) < 2.0);
    }

    #[tokio::test]
    async fn test_client_input_is_throttled() {
        let hub = LocalHub::new();
        let mut host = host_on(&hub, "ABCDEF", 2);
        let right = HeldDirections { right: true, ..Default::default() };
        let mut client = client_on(&hub, "ABCDEF", "guest", right);
        // Listens to the party without joining it
        let mut observer = hub.connect("observer");

        step_both(&mut host, &mut client, 20);
        assert_eq!(client.state.phase, MatchPhase::Playing);
        while observer.try_recv().is_some() {}

        let ticks = 30;
        step_both(&mut host, &mut client, ticks);
        let mut inputs = 0;
        while let Some(event) = observer.try_recv() {
            if let TransportEvent::Message(envelope) = event {
                if envelope.from == "guest" && envelope.msg.kind() == "player_input" {
                    inputs += 1;
                }
            }
        }

        let every = ticks_per_send(INPUT_SEND_TPS) as usize;
        assert_eq!(every, 3);
        assert!(inputs <= ticks.div_ceil(every), "sent {inputs} inputs in {ticks} ticks");
        assert!(inputs >= ticks / every - 1);
    }

    #[tokio::test]
    async fn test_conversion_and_game_over_propagate() {
        let hub = LocalHub::new();
        let mut host = host_on(&hub, "ABCDEF", 2);
        let mut client = client_on(&hub, "ABCDEF", "guest", HeldDirections::default());
        step_both(&mut host, &mut client, 20);
        host.state.next_power_up_at = Some(u64::MAX);

        // Paper overruns the last Rock soldier; Scissors is already gone
        for army in host.state.armies.values_mut() {
            army.set_soldiers(Vec::new());
        }
        let rock = host.state.armies.get_mut(&Faction::Rock).unwrap();
        rock.add_soldier(Soldier::new("rock-0", Faction::Rock, Vec2::new(20.0, -20.0)));
        let paper = host.state.armies.get_mut(&Faction::Paper).unwrap();
        paper.add_soldier(Soldier::new("paper-0", Faction::Paper, Vec2::new(20.5, -20.0)));

        step_both(&mut host, &mut client, 40);
        assert_eq!(host.state.phase, MatchPhase::Ended);
        assert_eq!(host.state.outcome.unwrap().winner, Some(Faction::Paper));
        assert_eq!(client.state.phase, MatchPhase::Ended);
        assert_eq!(client.state.outcome.unwrap().winner, Some(Faction::Paper));
        assert_eq!(client.finished(), Some(&RunEnd::Completed(client.state.outcome.unwrap())));
        assert!(client.state.armies[&Faction::Paper].get("rock-0").is_some());
    }

    #[tokio::test]
    async fn test_client_drag_is_forwarded() {
        let hub = LocalHub::new();
        let mut host = host_on(&hub, "ABCDEF", 2);
        let mut client = client_on(&hub, "ABCDEF", "guest", HeldDirections::default());
        host.state.config.placement_secs = 30.0;
        step_both(&mut host, &mut client, 2);
        client.step();
        assert_eq!(client.state.phase, MatchPhase::Placement);

        let zone = *host.state.arena.spawn_zone(Faction::Paper);
        let spot = Vec2::new(zone.min_x + 0.5, zone.max_z - 0.5);
        assert!(client.drag_local("paper-3", spot));
        assert!(!client.drag_local("paper-3", Vec2::ZERO));
        client.step();
        host.step();
        assert_eq!(host.state.armies[&Faction::Paper].get("paper-3").unwrap().position, spot);
    }

    #[test]
    fn test_solo_plays_cues_and_ends() {
        let audio = RecordingAudio::default();
        let c = Collaborators::init(
            Identity::new("solo", "solo").unwrap(),
            Box::new(audio.clone()),
            Box::new(HeldDirections::default()),
            Box::new(LogPresenter::default()),
        );
        let sim = SimConfig { placement_secs: 2.0, ..SimConfig::default() };
        let mut runtime = PeerRuntime::solo(sim, 3, c).unwrap();
        for _ in 0..120 {
            runtime.step();
        }
        assert_eq!(runtime.state.phase, MatchPhase::Playing);
        assert!(audio.0.lock().unwrap().contains(&SoundCue::CountdownTick));

        runtime.state.next_power_up_at = Some(u64::MAX);
        for faction in [Faction::Paper, Faction::Scissors] {
            runtime.state.armies.get_mut(&faction).unwrap().set_soldiers(Vec::new());
        }
        runtime.step();
        let outcome = MatchOutcome { winner: Some(Faction::Rock), final_count: 5 };
        assert_eq!(runtime.finished(), Some(&RunEnd::Completed(outcome)));
        assert!(audio.0.lock().unwrap().contains(&SoundCue::Victory));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let c = collab("solo", HeldDirections::default());
        let runtime = PeerRuntime::solo(SimConfig::default(), 3, c).unwrap();
        let end = runtime.run(tokio::time::sleep(std::time::Duration::from_millis(50))).await;
        assert_eq!(end, RunEnd::Shutdown);
    }
}
