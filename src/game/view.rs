//! Read-only projection of the match for presentation

use std::collections::BTreeMap;

use crate::util::time::ticks_to_secs;

use super::army::Army;
use super::{Faction, MatchPhase, MatchState, PowerUpKind, Vec2};

#[derive(Debug, Clone, PartialEq)]
pub struct SoldierView {
    pub id: String,
    pub position: Vec2,
    pub is_leader: bool,
    pub is_converting: bool,
}

/// A running effect with seconds left. `None` when the duration is not
/// known locally (mirrors).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveEffect {
    pub kind: PowerUpKind,
    pub remaining_secs: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArmyView {
    pub faction: Faction,
    pub soldiers: Vec<SoldierView>,
    pub count: usize,
    pub effects: Vec<ActiveEffect>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerUpView {
    pub id: u32,
    pub kind: PowerUpKind,
    pub position: Vec2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderView {
    pub phase: MatchPhase,
    pub local_faction: Option<Faction>,
    pub placement_remaining_secs: f32,
    pub armies: BTreeMap<Faction, ArmyView>,
    pub power_ups: Vec<PowerUpView>,
    pub decoys: Vec<(Faction, Vec2)>,
    pub winner: Option<Faction>,
    pub final_count: Option<usize>,
}

impl RenderView {
    pub fn capture(state: &MatchState) -> Self {
        let armies = state
            .armies
            .iter()
            .map(|(f, army)| (*f, army_view(army, state.tick)))
            .collect();

        Self {
            phase: state.phase,
            local_faction: state.local_faction,
            placement_remaining_secs: state.placement_remaining_secs(),
            armies,
            power_ups: state
                .power_ups
                .iter()
                .filter(|p| !p.collected)
                .map(|p| PowerUpView { id: p.id, kind: p.kind, position: p.position })
                .collect(),
            decoys: state.decoys.iter().map(|d| (d.faction, d.position)).collect(),
            winner: state.outcome.and_then(|o| o.winner),
            final_count: state.outcome.map(|o| o.final_count),
        }
    }

    pub fn count(&self, faction: Faction) -> usize {
        self.armies.get(&faction).map_or(0, |a| a.count)
    }
}

fn army_view(army: &Army, tick: u64) -> ArmyView {
    let status = &army.status;
    let mut effects = Vec::new();
    let mut push = |kind, active: bool, remaining: Option<u64>| {
        if active {
            effects.push(ActiveEffect { kind, remaining_secs: remaining.map(ticks_to_secs) });
        }
    };
    let boosted = status.speed_multiplier(tick) != 1.0;
    push(PowerUpKind::SpeedBoost, boosted, status.speed_remaining(tick));
    push(PowerUpKind::Invincibility, status.is_invincible(tick), status.invincible_remaining(tick));
    push(PowerUpKind::ReverseControl, status.is_reversed(tick), status.reversed_remaining(tick));
    push(PowerUpKind::MagnetAura, status.has_magnet(tick), status.magnet_remaining(tick));

    ArmyView {
        faction: army.faction,
        soldiers: army
            .soldiers()
            .iter()
            .map(|s| SoldierView {
                id: s.id.clone(),
                position: s.position,
                is_leader: s.is_leader,
                is_converting: s.is_converting,
            })
            .collect(),
        count: army.len(),
        effects,
    }
}
