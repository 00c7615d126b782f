//! Match state and the authoritative per-tick update

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::config::SimConfig;
use crate::util::time::{secs_to_ticks, tick_delta, ticks_to_secs, SIMULATION_TPS};

use super::ai::{AiBrain, AiPolicy};
use super::arena::Arena;
use super::army::Army;
use super::conversion::{ConversionSystem, PendingConversion};
use super::movement::MovementSystem;
use super::powerup::{Decoy, PowerUp, PowerUpSystem};
use super::{Faction, GameEvent, SimError, Vec2};

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// No match running
    Menu,
    /// Countdown while players arrange their soldiers
    Placement,
    /// Match in progress
    Playing,
    /// Match ended
    Ended,
}

impl MatchPhase {
    /// Menu -> Placement -> Playing -> Ended, and from Ended back to Menu
    /// (reset) or Placement (rematch)
    pub fn can_transition_to(self, next: MatchPhase) -> bool {
        matches!(
            (self, next),
            (MatchPhase::Menu, MatchPhase::Placement)
                | (MatchPhase::Placement, MatchPhase::Playing)
                | (MatchPhase::Playing, MatchPhase::Ended)
                | (MatchPhase::Ended, MatchPhase::Menu)
                | (MatchPhase::Ended, MatchPhase::Placement)
        )
    }
}

/// How a match finished. `winner: None` is a draw (no army left).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    pub winner: Option<Faction>,
    pub final_count: usize,
}

/// Match state. The host (or solo instance) owns the authoritative copy;
/// mirrors keep a shadow copy fed by the network protocol.
pub struct MatchState {
    pub phase: MatchPhase,
    pub tick: u64,
    pub is_solo: bool,
    pub local_faction: Option<Faction>,
    pub armies: BTreeMap<Faction, Army>,
    pub placement_ticks_remaining: u64,
    pub outcome: Option<MatchOutcome>,
    pub power_ups: Vec<PowerUp>,
    pub next_power_up_at: Option<u64>,
    pub next_power_up_id: u32,
    pub decoys: Vec<Decoy>,
    pub pending_conversions: Vec<PendingConversion>,
    /// Armies steered by the AI policy (solo mode)
    pub ai_factions: BTreeSet<Faction>,
    pub ai_brains: BTreeMap<Faction, AiBrain>,
    pub arena: Arena,
    pub config: SimConfig,
    pub seed: u64,
    pub rng: ChaCha8Rng,
}

impl MatchState {
    pub fn new(config: SimConfig, seed: u64) -> Self {
        Self {
            phase: MatchPhase::Menu,
            tick: 0,
            is_solo: false,
            local_faction: None,
            armies: empty_armies(),
            placement_ticks_remaining: 0,
            outcome: None,
            power_ups: Vec::new(),
            next_power_up_at: None,
            next_power_up_id: 0,
            decoys: Vec::new(),
            pending_conversions: Vec::new(),
            ai_factions: BTreeSet::new(),
            ai_brains: BTreeMap::new(),
            arena: Arena::standard(),
            config,
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Restart the RNG stream from a shared seed (match start / rematch)
    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    fn transition(&mut self, next: MatchPhase) -> Result<GameEvent, SimError> {
        if !self.phase.can_transition_to(next) {
            return Err(SimError::IllegalTransition { from: self.phase, to: next });
        }
        info!(from = ?self.phase, to = ?next, tick = self.tick, "Match phase change");
        self.phase = next;
        Ok(GameEvent::PhaseChanged { phase: next })
    }

    /// Enter Placement from Menu (new match) or Ended (rematch). Builds fresh
    /// armies in their spawn zones and starts the countdown.
    pub fn start_placement(
        &mut self,
        local_faction: Option<Faction>,
        is_solo: bool,
        ai_factions: impl IntoIterator<Item = Faction>,
    ) -> Result<Vec<GameEvent>, SimError> {
        let event = self.transition(MatchPhase::Placement)?;

        self.local_faction = local_faction;
        self.is_solo = is_solo;
        self.ai_factions = ai_factions.into_iter().collect();
        self.ai_brains = self.ai_factions.iter().map(|&f| (f, AiBrain::default())).collect();
        self.armies = Faction::ALL
            .iter()
            .map(|&f| {
                let anchor = self.arena.spawn_zone(f).center();
                let spacing = self.config.formation_spacing;
                (f, Army::new(f, self.config.soldiers_per_army, anchor, spacing))
            })
            .collect();
        self.clear_match_effects();
        self.placement_ticks_remaining = secs_to_ticks(self.config.placement_secs);

        Ok(vec![event])
    }

    /// Ended -> Menu
    pub fn reset_to_menu(&mut self) -> Result<(), SimError> {
        self.transition(MatchPhase::Menu)?;
        self.teardown();
        Ok(())
    }

    /// Unconditional return to Menu (host loss, leaving the party)
    pub fn abort(&mut self) {
        if self.phase != MatchPhase::Menu {
            info!(from = ?self.phase, "Match aborted");
        }
        self.phase = MatchPhase::Menu;
        self.teardown();
    }

    fn teardown(&mut self) {
        self.armies = empty_armies();
        self.clear_match_effects();
        self.placement_ticks_remaining = 0;
        self.ai_factions.clear();
        self.ai_brains.clear();
    }

    /// Drop every pending timer so nothing leaks into the next match
    fn clear_match_effects(&mut self) {
        self.outcome = None;
        self.power_ups.clear();
        self.next_power_up_at = None;
        self.decoys.clear();
        self.pending_conversions.clear();
    }

    pub fn begin_drag(&mut self, faction: Faction, soldier_id: &str) -> bool {
        if self.phase != MatchPhase::Placement {
            return false;
        }
        match self.armies.get_mut(&faction).and_then(|a| a.get_mut(soldier_id)) {
            Some(soldier) => {
                soldier.is_dragging = true;
                true
            }
            None => false,
        }
    }

    /// Placement drag/drop. Only inside the faction's own spawn zone and never
    /// inside the neutral zone; otherwise the soldier stays where it was.
    pub fn drag_soldier(&mut self, faction: Faction, soldier_id: &str, position: Vec2) -> bool {
        if self.phase != MatchPhase::Placement {
            return false;
        }
        if !self.arena.is_in_spawn_zone(position, faction)
            || self.arena.is_in_neutral_zone(position)
        {
            return false;
        }
        match self.armies.get_mut(&faction).and_then(|a| a.get_mut(soldier_id)) {
            Some(soldier) => {
                soldier.position = position;
                true
            }
            None => false,
        }
    }

    pub fn end_drag(&mut self, faction: Faction, soldier_id: &str) {
        if let Some(soldier) = self.armies.get_mut(&faction).and_then(|a| a.get_mut(soldier_id)) {
            soldier.is_dragging = false;
        }
    }

    /// A whole drag gesture: pick up, drop at `position`, release. A rejected
    /// drop still releases the soldier where it stood.
    pub fn place_soldier(&mut self, faction: Faction, soldier_id: &str, position: Vec2) -> bool {
        if !self.begin_drag(faction, soldier_id) {
            return false;
        }
        let moved = self.drag_soldier(faction, soldier_id, position);
        self.end_drag(faction, soldier_id);
        moved
    }

    /// One authoritative simulation tick
    pub fn tick(
        &mut self,
        local_input: Vec2,
        remote_inputs: &BTreeMap<Faction, Vec2>,
    ) -> Vec<GameEvent> {
        self.tick += 1;
        match self.phase {
            MatchPhase::Menu | MatchPhase::Ended => Vec::new(),
            MatchPhase::Placement => self.update_placement(),
            MatchPhase::Playing => self.update_playing(local_input, remote_inputs),
        }
    }

    /// Mirror tick: advance the clock and the local countdown display only.
    /// Phase changes come from the authority.
    pub fn advance_mirror(&mut self) -> Vec<GameEvent> {
        self.tick += 1;
        let mut events = Vec::new();
        if self.phase == MatchPhase::Placement {
            self.count_down(&mut events);
        }
        events
    }

    fn count_down(&mut self, events: &mut Vec<GameEvent>) {
        if self.placement_ticks_remaining == 0 {
            return;
        }
        let before = self.placement_seconds_shown();
        self.placement_ticks_remaining -= 1;
        let after = self.placement_seconds_shown();
        if after != before && after > 0 {
            events.push(GameEvent::CountdownTick { seconds_remaining: after });
        }
    }

    fn placement_seconds_shown(&self) -> u32 {
        self.placement_ticks_remaining.div_ceil(SIMULATION_TPS as u64) as u32
    }

    fn update_placement(&mut self) -> Vec<GameEvent> {
        let mut events = Vec::new();
        self.count_down(&mut events);
        if self.placement_ticks_remaining > 0 {
            return events;
        }
        // Timer only: there is no early all-ready start
        if let Ok(event) = self.transition(MatchPhase::Playing) {
            events.push(event);
        }
        for army in self.armies.values_mut() {
            for soldier in army.soldiers_mut() {
                soldier.is_dragging = false;
            }
        }
        PowerUpSystem::schedule_next(self);
        events
    }

    fn update_playing(
        &mut self,
        local_input: Vec2,
        remote_inputs: &BTreeMap<Faction, Vec2>,
    ) -> Vec<GameEvent> {
        let dt = tick_delta();
        let mut events = Vec::new();

        let inputs = self.resolve_inputs(local_input, remote_inputs);
        for (faction, input) in inputs {
            let Some(army) = self.armies.get_mut(&faction) else {
                continue;
            };
            let (arena, config, tick) = (&self.arena, &self.config, self.tick);
            let speed = MovementSystem::effective_speed(army, arena, tick, config);
            MovementSystem::move_leader(army, input, speed, dt, arena, tick, config);
            MovementSystem::follow_chain(army, speed, dt, &self.arena, &self.config);
        }

        events.extend(self.resolve_collisions());
        events.extend(PowerUpSystem::update(self));
        events.extend(self.check_win_condition());
        events
    }

    /// Local army: held input; AI armies: policy; remote armies: last
    /// received network input (zero until one arrives)
    fn resolve_inputs(
        &mut self,
        local_input: Vec2,
        remote_inputs: &BTreeMap<Faction, Vec2>,
    ) -> Vec<(Faction, Vec2)> {
        let mut inputs = Vec::with_capacity(Faction::ALL.len());
        for faction in Faction::ALL {
            let eliminated = self.armies.get(&faction).map_or(true, |a| a.is_eliminated());
            let input = if eliminated {
                Vec2::ZERO
            } else if self.local_faction == Some(faction) {
                local_input.clamp_length(1.0)
            } else if self.ai_factions.contains(&faction) {
                let brain = self.ai_brains.entry(faction).or_default();
                let (_, direction) = AiPolicy::decide(
                    faction,
                    &self.armies,
                    brain,
                    self.tick,
                    &mut self.rng,
                    &self.config,
                );
                direction
            } else {
                remote_inputs
                    .get(&faction)
                    .copied()
                    .unwrap_or(Vec2::ZERO)
                    .clamp_length(1.0)
            };
            inputs.push((faction, input));
        }
        inputs
    }

    /// Mark new losers as converting and finish conversions whose animation
    /// has run out
    fn resolve_collisions(&mut self) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let completes_at = self.tick + secs_to_ticks(self.config.conversion_secs);

        let encounters =
            ConversionSystem::detect(&self.armies, self.tick, self.config.soldier_radius);
        for encounter in encounters {
            let Some(soldier) = self
                .armies
                .get_mut(&encounter.from)
                .and_then(|a| a.get_mut(&encounter.loser_id))
            else {
                continue;
            };
            soldier.is_converting = true;
            debug!(
                soldier_id = %encounter.loser_id,
                from = %encounter.from,
                to = %encounter.to,
                "Conversion started"
            );
            events.push(GameEvent::ConversionStarted {
                soldier_id: encounter.loser_id.clone(),
                from: encounter.from,
                to: encounter.to,
            });
            self.pending_conversions.push(PendingConversion {
                soldier_id: encounter.loser_id,
                from: encounter.from,
                to: encounter.to,
                completes_at,
            });
        }

        let tick = self.tick;
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_conversions)
            .into_iter()
            .partition(|p| tick >= p.completes_at);
        self.pending_conversions = waiting;
        for pending in due {
            if ConversionSystem::complete(&mut self.armies, &pending) {
                events.push(GameEvent::Converted {
                    soldier_id: pending.soldier_id,
                    from: pending.from,
                    to: pending.to,
                });
            }
        }

        events
    }

    /// Exactly one army left wins; none left is a draw
    fn check_win_condition(&mut self) -> Vec<GameEvent> {
        if self.phase != MatchPhase::Playing {
            return Vec::new();
        }
        let remaining: Vec<&Army> = self.armies.values().filter(|a| !a.is_eliminated()).collect();
        let outcome = match remaining.as_slice() {
            [] => MatchOutcome { winner: None, final_count: 0 },
            [winner] => MatchOutcome { winner: Some(winner.faction), final_count: winner.len() },
            _ => return Vec::new(),
        };
        self.finish(outcome)
    }

    fn finish(&mut self, outcome: MatchOutcome) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if let Ok(event) = self.transition(MatchPhase::Ended) {
            events.push(event);
        }
        self.outcome = Some(outcome);
        self.pending_conversions.clear();
        info!(
            winner = ?outcome.winner,
            final_count = outcome.final_count,
            tick = self.tick,
            "Match ended"
        );
        events.push(GameEvent::MatchEnded { winner: outcome.winner });
        events
    }

    /// End the match on the authority's word (mirrors)
    pub fn force_end(&mut self, winner: Option<Faction>) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if self.phase == MatchPhase::Placement {
            if let Ok(event) = self.transition(MatchPhase::Playing) {
                events.push(event);
            }
        }
        if self.phase != MatchPhase::Playing {
            return events;
        }
        let final_count = winner
            .and_then(|f| self.armies.get(&f))
            .map_or(0, |a| a.len());
        events.extend(self.finish(MatchOutcome { winner, final_count }));
        events
    }

    /// Follow the authority's phase on a mirror. Only the forward
    /// Placement -> Playing step is taken from snapshots.
    pub fn mirror_phase(&mut self, phase: MatchPhase) -> Vec<GameEvent> {
        if self.phase == MatchPhase::Placement && phase == MatchPhase::Playing {
            self.placement_ticks_remaining = 0;
            return self.transition(phase).into_iter().collect();
        }
        Vec::new()
    }

    pub fn counts(&self) -> BTreeMap<Faction, usize> {
        self.armies.iter().map(|(f, a)| (*f, a.len())).collect()
    }

    pub fn placement_remaining_secs(&self) -> f32 {
        ticks_to_secs(self.placement_ticks_remaining)
    }
}

fn empty_armies() -> BTreeMap<Faction, Army> {
    Faction::ALL
        .iter()
        .map(|&f| (f, Army::from_soldiers(f, Vec::new())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{PowerUpKind, Soldier};

    fn no_remote() -> BTreeMap<Faction, Vec2> {
        BTreeMap::new()
    }

    fn placement_state() -> MatchState {
        let mut state = MatchState::new(SimConfig::default(), 42);
        state.start_placement(Some(Faction::Rock), false, []).unwrap();
        state
    }

    fn playing_state() -> MatchState {
        let mut state = placement_state();
        state.placement_ticks_remaining = 1;
        state.tick(Vec2::ZERO, &no_remote());
        assert_eq!(state.phase, MatchPhase::Playing);
        state.next_power_up_at = Some(u64::MAX);
        state
    }

    /// Replace rosters with the given soldiers (first per faction leads)
    fn set_rosters(state: &mut MatchState, placements: &[(Faction, &str, Vec2)]) {
        state.armies = empty_armies();
        for (f, id, p) in placements {
            state.armies.get_mut(f).unwrap().add_soldier(Soldier::new(*id, *f, *p));
        }
    }

    #[test]
    fn test_transition_table() {
        use MatchPhase::*;
        let legal = [
            (Menu, Placement),
            (Placement, Playing),
            (Playing, Ended),
            (Ended, Menu),
            (Ended, Placement),
        ];
        for from in [Menu, Placement, Playing, Ended] {
            for to in [Menu, Placement, Playing, Ended] {
                let expected = legal.contains(&(from, to));
                assert_eq!(from.can_transition_to(to), expected, "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn test_illegal_transition_is_error() {
        let mut state = MatchState::new(SimConfig::default(), 1);
        assert_eq!(
            state.reset_to_menu(),
            Err(SimError::IllegalTransition { from: MatchPhase::Menu, to: MatchPhase::Menu })
        );
        let mut state = placement_state();
        assert!(state.start_placement(None, false, []).is_err());
    }

    #[test]
    fn test_placement_builds_armies() {
        let state = placement_state();
        for f in Faction::ALL {
            let army = &state.armies[&f];
            assert_eq!(army.len(), 5);
            for s in army.soldiers() {
                assert!(state.arena.is_in_spawn_zone(s.position, f));
            }
        }
    }

    #[test]
    fn test_placement_counts_down_then_plays() {
        let mut state = placement_state();
        let total = state.placement_ticks_remaining;
        let mut ticks_seen = Vec::new();
        for _ in 0..total - 1 {
            for e in state.tick(Vec2::new(1.0, 0.0), &no_remote()) {
                if let GameEvent::CountdownTick { seconds_remaining } = e {
                    ticks_seen.push(seconds_remaining);
                }
            }
            assert_eq!(state.phase, MatchPhase::Placement);
        }
        assert_eq!(ticks_seen, (1..10).rev().collect::<Vec<u32>>());
        // Gameplay input during placement is ignored
        let spawn_center = state.arena.spawn_zone(Faction::Rock).center();
        assert_eq!(state.armies[&Faction::Rock].leader_position(), Some(spawn_center));
        let events = state.tick(Vec2::ZERO, &no_remote());
        assert!(events.contains(&GameEvent::PhaseChanged { phase: MatchPhase::Playing }));
        assert!(state.next_power_up_at.is_some());
    }

    #[test]
    fn test_drag_rules() {
        let mut state = placement_state();
        let zone = *state.arena.spawn_zone(Faction::Rock);
        let inside = Vec2::new(zone.min_x + 0.5, zone.min_z + 0.5);
        assert!(state.begin_drag(Faction::Rock, "rock-2"));
        assert!(state.drag_soldier(Faction::Rock, "rock-2", inside));
        assert_eq!(state.armies[&Faction::Rock].get("rock-2").unwrap().position, inside);

        // Outside own zone or inside the neutral zone: rejected, stays put
        assert!(!state.drag_soldier(Faction::Rock, "rock-2", Vec2::ZERO));
        let paper_zone = state.arena.spawn_zone(Faction::Paper).center();
        assert!(!state.drag_soldier(Faction::Rock, "rock-2", paper_zone));
        assert_eq!(state.armies[&Faction::Rock].get("rock-2").unwrap().position, inside);
        state.end_drag(Faction::Rock, "rock-2");
        assert!(!state.armies[&Faction::Rock].get("rock-2").unwrap().is_dragging);

        // Not during play
        let mut state = playing_state();
        assert!(!state.drag_soldier(Faction::Rock, "rock-2", inside));
    }

    #[test]
    fn test_place_soldier_releases_after_drop() {
        let mut state = placement_state();
        let zone = *state.arena.spawn_zone(Faction::Rock);
        let inside = Vec2::new(zone.max_x - 0.5, zone.max_z - 0.5);

        assert!(state.place_soldier(Faction::Rock, "rock-1", inside));
        let soldier = state.armies[&Faction::Rock].get("rock-1").unwrap();
        assert_eq!(soldier.position, inside);
        assert!(!soldier.is_dragging);

        // Rejected drop still lets go of the soldier
        assert!(!state.place_soldier(Faction::Rock, "rock-1", Vec2::ZERO));
        let soldier = state.armies[&Faction::Rock].get("rock-1").unwrap();
        assert_eq!(soldier.position, inside);
        assert!(!soldier.is_dragging);

        assert!(!state.place_soldier(Faction::Rock, "rock-99", inside));
        let mut state = playing_state();
        assert!(!state.place_soldier(Faction::Rock, "rock-1", inside));
    }

    #[test]
    fn test_leader_moves_with_input() {
        let mut state = playing_state();
        let before = state.armies[&Faction::Rock].leader_position().unwrap();
        state.tick(Vec2::new(1.0, 0.0), &no_remote());
        let after = state.armies[&Faction::Rock].leader_position().unwrap();
        let expected = state.config.base_speed * tick_delta();
        assert!((after.x - before.x - expected).abs() < 1e-4);
    }

    #[test]
    fn test_remote_input_drives_remote_army() {
        let mut state = playing_state();
        let before = state.armies[&Faction::Paper].leader_position().unwrap();
        state.tick(Vec2::ZERO, &no_remote());
        assert_eq!(state.armies[&Faction::Paper].leader_position().unwrap(), before);

        let remote = BTreeMap::from([(Faction::Paper, Vec2::new(0.0, 5.0))]);
        state.tick(Vec2::ZERO, &remote);
        let after = state.armies[&Faction::Paper].leader_position().unwrap();
        // Oversized remote input is clamped to unit length
        let expected = state.config.base_speed * tick_delta();
        assert!((after.z - before.z - expected).abs() < 1e-4);
    }

    #[test]
    fn test_rock_converts_scissors_after_delay() {
        let mut state = playing_state();
        // Followers sit within follow distance so nothing drifts
        set_rosters(
            &mut state,
            &[
                (Faction::Rock, "rock-0", Vec2::new(20.0, -20.0)),
                (Faction::Rock, "rock-1", Vec2::new(19.0, -20.0)),
                (Faction::Scissors, "scissors-0", Vec2::new(20.6, -20.0)),
                (Faction::Scissors, "scissors-1", Vec2::new(21.6, -20.0)),
                (Faction::Paper, "paper-0", Vec2::new(-20.0, 20.0)),
            ],
        );

        let events = state.tick(Vec2::ZERO, &no_remote());
        assert!(events.contains(&GameEvent::ConversionStarted {
            soldier_id: "scissors-0".into(),
            from: Faction::Scissors,
            to: Faction::Rock
        }));
        assert!(state.armies[&Faction::Scissors].get("scissors-0").unwrap().is_converting);
        assert_eq!(state.counts()[&Faction::Rock], 2);

        let delay = secs_to_ticks(state.config.conversion_secs);
        let mut converted = false;
        for _ in 0..delay {
            let events = state.tick(Vec2::ZERO, &no_remote());
            converted |= events.iter().any(|e| {
                matches!(e, GameEvent::Converted { soldier_id, .. } if soldier_id == "scissors-0")
            });
        }
        assert!(converted);
        let moved = state.armies[&Faction::Rock].get("scissors-0").unwrap();
        assert_eq!(moved.faction, Faction::Rock);
        assert_eq!(moved.id, "scissors-0");
        assert!(!moved.is_leader);
        assert_eq!(state.armies[&Faction::Scissors].leader().unwrap().id, "scissors-1");
        assert_eq!(state.counts()[&Faction::Rock], 3);
        assert_eq!(state.counts()[&Faction::Scissors], 1);
    }

    #[test]
    fn test_invincibility_blocks_conversion() {
        let mut state = playing_state();
        set_rosters(
            &mut state,
            &[
                (Faction::Rock, "rock-0", Vec2::new(20.0, -20.0)),
                (Faction::Scissors, "scissors-0", Vec2::new(20.6, -20.0)),
                (Faction::Paper, "paper-0", Vec2::new(-20.0, 20.0)),
            ],
        );
        PowerUpSystem::apply_effect(&mut state, PowerUpKind::Invincibility, Faction::Scissors);
        let events = state.tick(Vec2::ZERO, &no_remote());
        assert!(!events.iter().any(|e| matches!(e, GameEvent::ConversionStarted { .. })));
    }

    #[test]
    fn test_win_when_one_army_left() {
        let mut state = playing_state();
        set_rosters(
            &mut state,
            &[
                (Faction::Paper, "paper-0", Vec2::new(-20.0, 20.0)),
                (Faction::Paper, "paper-1", Vec2::new(-21.0, 20.0)),
            ],
        );
        let events = state.tick(Vec2::ZERO, &no_remote());
        assert!(events.contains(&GameEvent::MatchEnded { winner: Some(Faction::Paper) }));
        assert_eq!(state.phase, MatchPhase::Ended);
        let expected = MatchOutcome { winner: Some(Faction::Paper), final_count: 2 };
        assert_eq!(state.outcome, Some(expected));

        // Ended ignores further ticks
        assert!(state.tick(Vec2::new(1.0, 0.0), &no_remote()).is_empty());
    }

    #[test]
    fn test_mutual_elimination_is_draw() {
        let mut state = playing_state();
        set_rosters(&mut state, &[]);
        let events = state.tick(Vec2::ZERO, &no_remote());
        assert!(events.contains(&GameEvent::MatchEnded { winner: None }));
        assert_eq!(state.phase, MatchPhase::Ended);
        assert_eq!(state.outcome, Some(MatchOutcome { winner: None, final_count: 0 }));
    }

    #[test]
    fn test_no_end_while_two_armies_remain() {
        let mut state = playing_state();
        for _ in 0..10 {
            state.tick(Vec2::ZERO, &no_remote());
        }
        assert_eq!(state.phase, MatchPhase::Playing);
    }

    #[test]
    fn test_rematch_and_reset() {
        let mut state = playing_state();
        set_rosters(&mut state, &[(Faction::Rock, "rock-0", Vec2::new(0.0, -20.0))]);
        state.tick(Vec2::ZERO, &no_remote());
        assert_eq!(state.phase, MatchPhase::Ended);

        state.start_placement(Some(Faction::Rock), false, []).unwrap();
        assert_eq!(state.phase, MatchPhase::Placement);
        assert!(state.outcome.is_none());
        assert_eq!(state.counts()[&Faction::Scissors], 5);

        let mut state = playing_state();
        set_rosters(&mut state, &[(Faction::Rock, "rock-0", Vec2::new(0.0, -20.0))]);
        state.tick(Vec2::ZERO, &no_remote());
        state.reset_to_menu().unwrap();
        assert_eq!(state.phase, MatchPhase::Menu);
        assert!(state.armies.values().all(|a| a.is_eliminated()));
    }

    #[test]
    fn test_solo_ai_armies_move() {
        let mut state = MatchState::new(SimConfig::default(), 5);
        state
            .start_placement(Some(Faction::Rock), true, [Faction::Paper, Faction::Scissors])
            .unwrap();
        state.placement_ticks_remaining = 1;
        state.tick(Vec2::ZERO, &no_remote());
        state.next_power_up_at = Some(u64::MAX);
        let before = state.armies[&Faction::Paper].leader_position().unwrap();
        for _ in 0..30 {
            state.tick(Vec2::ZERO, &no_remote());
        }
        assert_ne!(state.armies[&Faction::Paper].leader_position().unwrap(), before);
        assert_eq!(
            state.armies[&Faction::Rock].leader_position().unwrap(),
            state.arena.spawn_zone(Faction::Rock).center()
        );
    }

    #[test]
    fn test_force_end_from_mirror() {
        let mut state = placement_state();
        let events = state.force_end(Some(Faction::Scissors));
        assert!(events.contains(&GameEvent::MatchEnded { winner: Some(Faction::Scissors) }));
        assert_eq!(state.outcome.unwrap().final_count, 5);
        // Already ended: nothing further
        assert!(state.force_end(Some(Faction::Rock)).is_empty());
    }

    #[test]
    fn test_abort_clears_timers() {
        let mut state = playing_state();
        PowerUpSystem::apply_effect(&mut state, PowerUpKind::CloneLeader, Faction::Rock);
        state.abort();
        assert_eq!(state.phase, MatchPhase::Menu);
        assert!(state.decoys.is_empty());
        assert!(state.pending_conversions.is_empty());
        assert!(state.next_power_up_at.is_none());
    }
}
