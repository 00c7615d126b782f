//! Power-ups: spawn scheduling, collection, effects and their expiry

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::util::time::{secs_to_ticks, tick_delta};

use super::movement::MovementSystem;
use super::r#match::MatchState;
use super::{Faction, GameEvent, Soldier, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerUpKind {
    SpeedBoost,
    Invincibility,
    Reinforcement,
    MagnetAura,
    SplitFormation,
    CloneLeader,
    ReverseControl,
}

impl PowerUpKind {
    pub const ALL: [PowerUpKind; 7] = [
        PowerUpKind::SpeedBoost,
        PowerUpKind::Invincibility,
        PowerUpKind::Reinforcement,
        PowerUpKind::MagnetAura,
        PowerUpKind::SplitFormation,
        PowerUpKind::CloneLeader,
        PowerUpKind::ReverseControl,
    ];
}

/// A power-up lying on the arena floor
#[derive(Debug, Clone, PartialEq)]
pub struct PowerUp {
    pub id: u32,
    pub kind: PowerUpKind,
    pub position: Vec2,
    pub collected: bool,
    /// Tick it appeared on
    pub spawned_at: u64,
}

/// Cosmetic copy of a leader; never collides and never counts
#[derive(Debug, Clone, PartialEq)]
pub struct Decoy {
    pub faction: Faction,
    pub position: Vec2,
    pub expires_at: u64,
}

const DECOY_OFFSET: f32 = 1.5;

/// Power-up system; runs once per Playing tick on the authority
pub struct PowerUpSystem;

impl PowerUpSystem {
    /// Arm the spawn countdown: base interval plus or minus the variance
    pub fn schedule_next(state: &mut MatchState) {
        let cfg = &state.config;
        let variance = cfg.power_up_variance_secs;
        let offset = if variance > 0.0 {
            state.rng.gen_range(-variance..=variance)
        } else {
            0.0
        };
        let secs = (cfg.power_up_interval_secs + offset).max(0.0);
        state.next_power_up_at = Some(state.tick + secs_to_ticks(secs));
    }

    pub fn update(state: &mut MatchState) -> Vec<GameEvent> {
        let mut events = Vec::new();
        Self::expire_effects(state, &mut events);
        Self::spawn_if_due(state, &mut events);
        Self::collect(state, &mut events);
        Self::apply_magnets(state);
        state.power_ups.retain(|p| !p.collected);
        events
    }

    fn expire_effects(state: &mut MatchState, events: &mut Vec<GameEvent>) {
        let tick = state.tick;
        const KINDS: [PowerUpKind; 4] = [
            PowerUpKind::SpeedBoost,
            PowerUpKind::Invincibility,
            PowerUpKind::ReverseControl,
            PowerUpKind::MagnetAura,
        ];
        for army in state.armies.values_mut() {
            let ended = army.status.expire(tick);
            for (kind, _) in KINDS.iter().zip(ended).filter(|(_, e)| *e) {
                events.push(GameEvent::EffectExpired { faction: army.faction, kind: *kind });
            }
        }

        let (expired, live): (Vec<Decoy>, Vec<Decoy>) = std::mem::take(&mut state.decoys)
            .into_iter()
            .partition(|d| tick >= d.expires_at);
        state.decoys = live;
        for decoy in expired {
            events.push(GameEvent::EffectExpired {
                faction: decoy.faction,
                kind: PowerUpKind::CloneLeader,
            });
        }
    }

    fn spawn_if_due(state: &mut MatchState, events: &mut Vec<GameEvent>) {
        let Some(due) = state.next_power_up_at else {
            Self::schedule_next(state);
            return;
        };
        if state.tick < due {
            return;
        }

        let kind = PowerUpKind::ALL[state.rng.gen_range(0..PowerUpKind::ALL.len())];
        let position = state.arena.random_power_up_position(&mut state.rng);
        let id = state.next_power_up_id;
        state.next_power_up_id += 1;
        state.power_ups.push(PowerUp {
            id,
            kind,
            position,
            collected: false,
            spawned_at: state.tick,
        });
        debug!(power_up = id, kind = ?kind, x = position.x, z = position.z, "Power-up spawned");
        events.push(GameEvent::PowerUpSpawned { id, kind, position });
        Self::schedule_next(state);
    }

    fn collect(state: &mut MatchState, events: &mut Vec<GameEvent>) {
        let radius = state.config.pickup_radius;
        let mut collected: Vec<(usize, Faction)> = Vec::new();

        for (idx, power_up) in state.power_ups.iter().enumerate() {
            if power_up.collected {
                continue;
            }
            let collector = state.armies.values().find(|army| {
                army.soldiers()
                    .iter()
                    .any(|s| s.position.distance(power_up.position) < radius)
            });
            if let Some(army) = collector {
                collected.push((idx, army.faction));
            }
        }

        for (idx, faction) in collected {
            let power_up = &mut state.power_ups[idx];
            power_up.collected = true;
            let (id, kind) = (power_up.id, power_up.kind);
            debug!(power_up = id, kind = ?kind, faction = %faction, "Power-up collected");
            events.push(GameEvent::PowerUpCollected { id, kind, faction });
            Self::apply_effect(state, kind, faction);
        }
    }

    /// Apply one effect for the collecting faction
    pub fn apply_effect(state: &mut MatchState, kind: PowerUpKind, faction: Faction) {
        let tick = state.tick;
        match kind {
            PowerUpKind::SpeedBoost => {
                let until = tick + secs_to_ticks(state.config.speed_boost_secs);
                if let Some(army) = state.armies.get_mut(&faction) {
                    army.status.speed_multiplier = state.config.speed_boost_multiplier;
                    army.status.speed_until = Some(until);
                }
            }
            PowerUpKind::Invincibility => {
                let until = tick + secs_to_ticks(state.config.invincibility_secs);
                if let Some(army) = state.armies.get_mut(&faction) {
                    army.status.invincible_until = Some(until);
                }
            }
            PowerUpKind::Reinforcement => Self::reinforce(state, faction),
            PowerUpKind::MagnetAura => {
                let until = tick + secs_to_ticks(state.config.magnet_secs);
                if let Some(army) = state.armies.get_mut(&faction) {
                    army.status.magnet_until = Some(until);
                }
            }
            PowerUpKind::SplitFormation => Self::scatter_others(state, faction),
            PowerUpKind::CloneLeader => {
                let leader = state.armies.get(&faction).and_then(|a| a.leader_position());
                if let Some(leader) = leader {
                    state.decoys.push(Decoy {
                        faction,
                        position: state
                            .arena
                            .clamp_to_bounds(leader + Vec2::new(DECOY_OFFSET, 0.0)),
                        expires_at: tick + secs_to_ticks(state.config.clone_secs),
                    });
                }
            }
            PowerUpKind::ReverseControl => {
                let others = faction.others();
                let live: Vec<Faction> = others
                    .iter()
                    .copied()
                    .filter(|f| state.armies.get(f).is_some_and(|a| !a.is_eliminated()))
                    .collect();
                let pool: &[Faction] = if live.is_empty() { &others } else { &live };
                let target = pool[state.rng.gen_range(0..pool.len())];
                let until = tick + secs_to_ticks(state.config.reverse_secs);
                if let Some(army) = state.armies.get_mut(&target) {
                    army.status.reversed_until = Some(until);
                }
            }
        }
    }

    /// Add soldiers next to the tail of the chain, capped at the max roster
    fn reinforce(state: &mut MatchState, faction: Faction) {
        let MatchState { armies, arena, config, rng, .. } = state;
        let Some(army) = armies.get_mut(&faction) else {
            return;
        };
        let Some(anchor) = army.soldiers().last().map(|s| s.position) else {
            return;
        };
        let room = config.max_roster.saturating_sub(army.len());
        for _ in 0..config.soldiers_to_restore.min(room) {
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            let target = anchor + Vec2::from_angle(angle) * config.formation_spacing;
            let position = MovementSystem::slide(arena, anchor, target, config.soldier_radius);
            let id = army.next_reinforcement_id();
            army.add_soldier(Soldier::new(id, faction, position));
        }
    }

    /// Knock every other faction's followers outward in random directions
    fn scatter_others(state: &mut MatchState, faction: Faction) {
        let MatchState { armies, arena, config, rng, .. } = state;
        for other in faction.others() {
            let Some(army) = armies.get_mut(&other) else {
                continue;
            };
            for soldier in army.soldiers_mut().iter_mut().filter(|s| !s.is_leader) {
                let dir = Vec2::from_angle(rng.gen_range(0.0..std::f32::consts::TAU));
                let from = soldier.position;
                let target = from + dir * config.split_impulse;
                soldier.position =
                    MovementSystem::slide(arena, from, target, config.soldier_radius);
            }
        }
    }

    /// Pull prey stragglers near a magnetised leader toward it
    fn apply_magnets(state: &mut MatchState) {
        let tick = state.tick;
        let magnets: Vec<(Faction, Vec2)> = state
            .armies
            .values()
            .filter(|a| a.status.has_magnet(tick))
            .filter_map(|a| a.leader_position().map(|p| (a.faction, p)))
            .collect();
        if magnets.is_empty() {
            return;
        }

        let MatchState { armies, arena, config, .. } = state;
        let max_step = config.magnet_pull_speed * tick_delta();
        for (faction, center) in magnets {
            let Some(prey) = armies.get_mut(&faction.prey()) else {
                continue;
            };
            for soldier in prey.soldiers_mut() {
                if soldier.is_leader || soldier.is_converting {
                    continue;
                }
                let offset = center - soldier.position;
                let distance = offset.length();
                if distance > config.magnet_range || distance < 1e-6 {
                    continue;
                }
                let from = soldier.position;
                let to = from + offset.normalized_or_zero() * max_step.min(distance);
                soldier.position = MovementSystem::slide(arena, from, to, config.soldier_radius);
            }
        }
    }
}
