//! Steering policy for armies without a human behind them

use rand::Rng;
use std::collections::BTreeMap;

use crate::config::SimConfig;
use crate::util::time::secs_to_ticks;

use super::army::Army;
use super::{Faction, Vec2};

/// What the policy decided this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiIntent {
    Flee,
    Chase,
    Wander,
    Idle,
}

/// Per-army wander memory
#[derive(Debug, Clone, Default)]
pub struct AiBrain {
    heading: Vec2,
    next_pick_at: u64,
}

/// Priority: flee the nearest threat in range, else chase the nearest prey,
/// else wander on a heading re-rolled at most every wander interval.
pub struct AiPolicy;

impl AiPolicy {
    pub fn decide<R: Rng + ?Sized>(
        faction: Faction,
        armies: &BTreeMap<Faction, Army>,
        brain: &mut AiBrain,
        tick: u64,
        rng: &mut R,
        cfg: &SimConfig,
    ) -> (AiIntent, Vec2) {
        let Some(origin) = armies.get(&faction).and_then(|a| a.leader_position()) else {
            return (AiIntent::Idle, Vec2::ZERO);
        };

        if let Some((threat, distance)) = nearest(armies, faction.predator(), origin) {
            if distance <= cfg.ai_threat_radius {
                let away = (origin - threat).normalized_or_zero();
                if !away.is_zero() {
                    return (AiIntent::Flee, away);
                }
            }
        }

        if let Some((prey, _)) = nearest(armies, faction.prey(), origin) {
            let toward = (prey - origin).normalized_or_zero();
            if !toward.is_zero() {
                return (AiIntent::Chase, toward);
            }
        }

        if tick >= brain.next_pick_at || brain.heading.is_zero() {
            brain.heading = Vec2::from_angle(rng.gen_range(0.0..std::f32::consts::TAU));
            brain.next_pick_at = tick + secs_to_ticks(cfg.ai_wander_secs);
        }
        (AiIntent::Wander, brain.heading)
    }
}

/// Nearest soldier of `target` that can still take part in a collision
fn nearest(armies: &BTreeMap<Faction, Army>, target: Faction, origin: Vec2) -> Option<(Vec2, f32)> {
    armies
        .get(&target)?
        .soldiers()
        .iter()
        .filter(|s| !s.is_converting)
        .map(|s| (s.position, s.position.distance(origin)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}
