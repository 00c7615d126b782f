//! Collision-driven conversion between factions

use std::collections::{BTreeMap, HashSet};

use super::army::Army;
use super::faction::dominance;
use super::{Faction, Vec2};

/// A soldier mid conversion animation, resolved at `completes_at`
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConversion {
    pub soldier_id: String,
    pub from: Faction,
    pub to: Faction,
    pub completes_at: u64,
}

/// A collision this tick that the losing soldier did not survive
#[derive(Debug, Clone, PartialEq)]
pub struct Encounter {
    pub loser_id: String,
    pub from: Faction,
    pub to: Faction,
}

/// Conversion system: detects losing collisions and moves soldiers between rosters
pub struct ConversionSystem;

impl ConversionSystem {
    /// Two soldiers touch when closer than twice the soldier radius
    pub fn soldiers_collide(a: Vec2, b: Vec2, radius: f32) -> bool {
        let d = b - a;
        let combined = radius * 2.0;
        d.x * d.x + d.z * d.z < combined * combined
    }

    /// Pairwise check across every distinct pair of armies. A soldier loses
    /// at most once per tick; converting soldiers and invincible armies are
    /// skipped.
    pub fn detect(armies: &BTreeMap<Faction, Army>, tick: u64, radius: f32) -> Vec<Encounter> {
        let mut encounters = Vec::new();
        let mut marked: HashSet<&str> = HashSet::new();
        let live: Vec<&Army> = armies
            .values()
            .filter(|a| !a.is_eliminated() && !a.status.is_invincible(tick))
            .collect();

        for (i, a) in live.iter().enumerate() {
            for b in &live[i + 1..] {
                let Some(winner) = dominance(a.faction, b.faction) else {
                    continue;
                };
                for sa in a.soldiers() {
                    if sa.is_converting || marked.contains(sa.id.as_str()) {
                        continue;
                    }
                    for sb in b.soldiers() {
                        if sb.is_converting || marked.contains(sb.id.as_str()) {
                            continue;
                        }
                        if !Self::soldiers_collide(sa.position, sb.position, radius) {
                            continue;
                        }
                        let loser = if winner == a.faction { sb } else { sa };
                        marked.insert(loser.id.as_str());
                        encounters.push(Encounter {
                            loser_id: loser.id.clone(),
                            from: loser.faction,
                            to: winner,
                        });
                        if loser.id == sa.id {
                            break;
                        }
                    }
                }
            }
        }

        encounters
    }

    /// Atomically move a soldier from one roster to another, flipping its
    /// faction tag. No-op (false) if either side is unknown.
    pub fn transfer(
        armies: &mut BTreeMap<Faction, Army>,
        soldier_id: &str,
        from: Faction,
        to: Faction,
    ) -> bool {
        if from == to || !armies.contains_key(&to) {
            return false;
        }
        let removed = armies.get_mut(&from).and_then(|a| a.remove_soldier(soldier_id));
        let Some(mut soldier) = removed else {
            return false;
        };
        soldier.change_faction(to);
        soldier.is_converting = false;
        soldier.is_dragging = false;
        if let Some(army) = armies.get_mut(&to) {
            army.add_soldier(soldier);
        }
        true
    }

    /// Finish a timed conversion. The soldier must still be in the losing
    /// roster and still flagged as converting.
    pub fn complete(armies: &mut BTreeMap<Faction, Army>, pending: &PendingConversion) -> bool {
        let still_converting = armies
            .get(&pending.from)
            .and_then(|a| a.get(&pending.soldier_id))
            .is_some_and(|s| s.is_converting);
        still_converting && Self::transfer(armies, &pending.soldier_id, pending.from, pending.to)
    }

    /// Apply a conversion announced by the authority, skipping the animation.
    /// Ignored if the soldier is unknown or already mid conversion.
    pub fn apply_remote(
        armies: &mut BTreeMap<Faction, Army>,
        soldier_id: &str,
        from: Faction,
        to: Faction,
    ) -> bool {
        let idle = armies
            .get(&from)
            .and_then(|a| a.get(soldier_id))
            .is_some_and(|s| !s.is_converting);
        idle && Self::transfer(armies, soldier_id, from, to)
    }
}
