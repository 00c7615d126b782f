//! Client-side reconciliation against the host's game_state

use std::collections::HashMap;
use tracing::debug;

use crate::game::powerup::PowerUp;
use crate::game::{Army, Faction, MatchState, Soldier, Vec2};
use crate::util::time::SIMULATION_TPS;

use super::protocol::GameStateMsg;

/// Apply an authoritative snapshot to a mirror.
///
/// Rosters are rebuilt in the host's order, matched by soldier id: known
/// soldiers ease toward the host position by `lerp`, unknown ids appear at
/// the host position, and local soldiers the host no longer lists are
/// dropped. Status flags are overwritten.
pub fn apply_game_state(state: &mut MatchState, msg: &GameStateMsg, lerp: f32) {
    let lerp = lerp.clamp(0.0, 1.0);

    // Pool every local soldier of the listed factions so a soldier converted
    // on the host but not yet here is found under its new faction.
    let mut pool: HashMap<String, Soldier> = HashMap::new();
    for faction in msg.armies.keys() {
        if let Some(army) = state.armies.get_mut(faction) {
            for soldier in army.take_soldiers() {
                pool.insert(soldier.id.clone(), soldier);
            }
        }
    }

    for (faction, snapshot) in &msg.armies {
        let roster: Vec<Soldier> = snapshot
            .soldiers
            .iter()
            .map(|remote| {
                let target = Vec2::new(remote.x, remote.z);
                match pool.remove(&remote.id) {
                    Some(mut soldier) => {
                        if soldier.faction != *faction {
                            debug!(
                                soldier_id = %remote.id,
                                from = %soldier.faction,
                                to = %faction,
                                "Roster sync moved soldier"
                            );
                            soldier.change_faction(*faction);
                            soldier.is_converting = false;
                        }
                        soldier.position = soldier.position + (target - soldier.position) * lerp;
                        soldier
                    }
                    None => Soldier::new(remote.id.clone(), *faction, target),
                }
            })
            .collect();

        let army = state
            .armies
            .entry(*faction)
            .or_insert_with(|| Army::from_soldiers(*faction, Vec::new()));
        army.set_soldiers(roster);
        army.status.set_mirrored(
            snapshot.is_invincible,
            snapshot.speed_multiplier,
            snapshot.is_reversed,
            snapshot.has_magnet,
        );
    }

    if !pool.is_empty() {
        debug!(dropped = pool.len(), "Roster sync dropped soldiers unknown to host");
    }

    if msg.phase.is_some() {
        state.placement_ticks_remaining =
            (msg.placement_remaining.max(0.0) * SIMULATION_TPS as f32).round() as u64;
        state.power_ups = msg
            .power_ups
            .iter()
            .map(|p| PowerUp {
                id: p.id,
                kind: p.kind,
                position: Vec2::new(p.x, p.z),
                collected: false,
                spawned_at: state.tick,
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::game::MatchPhase;
    use crate::net::protocol::{ArmySnapshot, SoldierSnapshot};
    use std::collections::BTreeMap;

    /// Largest distance between a local soldier and its host position
    fn max_position_error(state: &MatchState, msg: &GameStateMsg) -> f32 {
        msg.armies
            .iter()
            .flat_map(|(faction, snapshot)| {
                let army = state.armies.get(faction);
                snapshot.soldiers.iter().map(move |remote| {
                    let host = Vec2::new(remote.x, remote.z);
                    army.and_then(|a| a.get(&remote.id))
                        .map_or(f32::INFINITY, |s| s.position.distance(host))
                })
            })
            .fold(0.0, f32::max)
    }

    fn soldier(id: &str, x: f32, z: f32, is_leader: bool) -> SoldierSnapshot {
        SoldierSnapshot { id: id.into(), x, z, is_leader }
    }

    fn army(soldiers: Vec<SoldierSnapshot>) -> ArmySnapshot {
        ArmySnapshot {
            soldiers,
            is_invincible: false,
            speed_multiplier: 1.0,
            is_reversed: false,
            has_magnet: false,
        }
    }

    fn mirror() -> MatchState {
        let mut state = MatchState::new(SimConfig::default(), 1);
        state.start_placement(Some(Faction::Paper), false, []).unwrap();
        state
    }

    fn msg(armies: BTreeMap<Faction, ArmySnapshot>) -> GameStateMsg {
        GameStateMsg {
            armies,
            phase: Some(MatchPhase::Playing),
            placement_remaining: 0.0,
            power_ups: Vec::new(),
        }
    }

    fn leader_only(faction: Faction, id: &str, at: Vec2) -> GameStateMsg {
        msg(BTreeMap::from([(faction, army(vec![soldier(id, at.x, at.z, true)]))]))
    }

    #[test]
    fn test_lerps_toward_server_position() {
        let mut state = mirror();
        let start = state.armies[&Faction::Rock].get("rock-0").unwrap().position;
        let target = start + Vec2::new(10.0, 0.0);
        let update = leader_only(Faction::Rock, "rock-0", target);
        apply_game_state(&mut state, &update, 0.3);
        let pos = state.armies[&Faction::Rock].get("rock-0").unwrap().position;
        assert!((pos.x - (start.x + 3.0)).abs() < 1e-4);
    }

    #[test]
    fn test_replay_is_monotone_without_overshoot() {
        let mut state = mirror();
        let start = state.armies[&Faction::Rock].get("rock-0").unwrap().position;
        let target = start + Vec2::new(-6.0, 4.0);
        let update = leader_only(Faction::Rock, "rock-0", target);

        let mut last_error = start.distance(target);
        for _ in 0..20 {
            apply_game_state(&mut state, &update, 0.3);
            let error = max_position_error(&state, &update);
            assert!(error <= last_error);
            last_error = error;
            // Stays on the segment toward the target
            let pos = state.armies[&Faction::Rock].leader_position().unwrap();
            assert!(pos.x >= target.x - 1e-4 && pos.x <= start.x + 1e-4);
            assert!(pos.z <= target.z + 1e-4 && pos.z >= start.z - 1e-4);
        }
        assert!(last_error < 0.01);
    }

    #[test]
    fn test_roster_sync_adopts_missed_conversion() {
        let mut state = mirror();
        let scissors_1 = state.armies[&Faction::Scissors].get("scissors-1").unwrap().position;
        // Host converted scissors-1 to Rock; the conversion message was lost
        let mut rock: Vec<SoldierSnapshot> = state.armies[&Faction::Rock]
            .soldiers()
            .iter()
            .map(|s| soldier(&s.id, s.position.x, s.position.z, s.is_leader))
            .collect();
        rock.push(soldier("scissors-1", scissors_1.x, scissors_1.z, false));
        let scissors: Vec<SoldierSnapshot> = state.armies[&Faction::Scissors]
            .soldiers()
            .iter()
            .filter(|s| s.id != "scissors-1")
            .map(|s| soldier(&s.id, s.position.x, s.position.z, s.is_leader))
            .collect();
        let update = msg(BTreeMap::from([
            (Faction::Rock, army(rock)),
            (Faction::Scissors, army(scissors)),
        ]));

        apply_game_state(&mut state, &update, 0.3);
        assert_eq!(state.counts()[&Faction::Rock], 6);
        assert_eq!(state.counts()[&Faction::Scissors], 4);
        let moved = state.armies[&Faction::Rock].get("scissors-1").unwrap();
        assert_eq!(moved.faction, Faction::Rock);
        assert_eq!(moved.position, scissors_1);
    }

    #[test]
    fn test_unknown_ids_created_and_stale_dropped() {
        let mut state = mirror();
        let update = leader_only(Faction::Paper, "paper-r0", Vec2::new(1.0, 2.0));
        apply_game_state(&mut state, &update, 0.3);
        let paper = &state.armies[&Faction::Paper];
        assert_eq!(paper.len(), 1);
        assert_eq!(paper.leader().unwrap().id, "paper-r0");
        assert_eq!(paper.leader_position(), Some(Vec2::new(1.0, 2.0)));
        // Factions absent from the message are untouched
        assert_eq!(state.counts()[&Faction::Rock], 5);
    }

    #[test]
    fn test_status_flags_overwritten() {
        let mut state = mirror();
        let mut snapshot = army(vec![soldier("rock-0", 0.0, -20.0, true)]);
        snapshot.is_invincible = true;
        snapshot.speed_multiplier = 1.6;
        let update = msg(BTreeMap::from([(Faction::Rock, snapshot)]));
        apply_game_state(&mut state, &update, 0.3);
        let status = &state.armies[&Faction::Rock].status;
        assert!(status.is_invincible(state.tick));
        assert_eq!(status.speed_multiplier(state.tick), 1.6);

        let update = leader_only(Faction::Rock, "rock-0", Vec2::new(0.0, -20.0));
        apply_game_state(&mut state, &update, 0.3);
        assert!(!state.armies[&Faction::Rock].status.is_invincible(state.tick));
    }
}
