//! game_state building and send pacing

use tracing::debug;

use crate::game::{MatchPhase, MatchState};

use super::protocol::{ArmySnapshot, GameStateMsg, PeerMsg, PowerUpSnapshot, SoldierSnapshot};

/// Builds game_state messages at a fixed cadence
pub struct SnapshotBuilder {
    /// Ticks since the last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (match end, new joiner)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    pub fn build(&self, state: &MatchState) -> PeerMsg {
        let tick = state.tick;
        let armies = state
            .armies
            .iter()
            .map(|(faction, army)| {
                let snapshot = ArmySnapshot {
                    soldiers: army
                        .soldiers()
                        .iter()
                        .map(|s| SoldierSnapshot {
                            id: s.id.clone(),
                            x: s.position.x,
                            z: s.position.z,
                            is_leader: s.is_leader,
                        })
                        .collect(),
                    is_invincible: army.status.is_invincible(tick),
                    speed_multiplier: army.status.speed_multiplier(tick),
                    is_reversed: army.status.is_reversed(tick),
                    has_magnet: army.status.has_magnet(tick),
                };
                (*faction, snapshot)
            })
            .collect();

        let placement_remaining = if state.phase == MatchPhase::Placement {
            state.placement_remaining_secs()
        } else {
            0.0
        };

        PeerMsg::GameState(GameStateMsg {
            armies,
            phase: Some(state.phase),
            placement_remaining,
            power_ups: state
                .power_ups
                .iter()
                .filter(|p| !p.collected)
                .map(|p| PowerUpSnapshot {
                    id: p.id,
                    kind: p.kind,
                    x: p.position.x,
                    z: p.position.z,
                })
                .collect(),
        })
    }
}

/// Snapshot size stats for debugging
#[derive(Debug, Default)]
pub struct SnapshotStats {
    pub total_snapshots: u64,
    pub total_bytes: u64,
    pub avg_soldiers_per_snapshot: f32,
}

impl SnapshotStats {
    pub fn record(&mut self, soldier_count: usize, bytes: usize) {
        self.total_snapshots += 1;
        self.total_bytes += bytes as u64;

        // Running average
        let n = self.total_snapshots as f32;
        self.avg_soldiers_per_snapshot =
            self.avg_soldiers_per_snapshot * ((n - 1.0) / n) + (soldier_count as f32 / n);

        if self.total_snapshots % 300 == 0 {
            debug!(
                snapshots = self.total_snapshots,
                bytes = self.total_bytes,
                avg_soldiers = self.avg_soldiers_per_snapshot,
                "Snapshot stats"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::game::Faction;

    #[test]
    fn test_pacing_every_second_tick() {
        let mut builder = SnapshotBuilder::new(2);
        let sent: Vec<bool> = (0..6).map(|_| builder.should_send()).collect();
        assert_eq!(sent, vec![false, true, false, true, false, true]);
        builder.should_send();
        builder.force_next();
        assert!(builder.should_send());
    }

    #[test]
    fn test_build_carries_roster_order_and_phase() {
        let mut state = MatchState::new(SimConfig::default(), 9);
        state.start_placement(Some(Faction::Rock), false, []).unwrap();
        let PeerMsg::GameState(msg) = SnapshotBuilder::new(2).build(&state) else {
            panic!("expected game_state");
        };
        assert_eq!(msg.phase, Some(MatchPhase::Placement));
        assert!((msg.placement_remaining - 10.0).abs() < 1e-4);
        let rock = &msg.armies[&Faction::Rock];
        assert_eq!(rock.soldiers.len(), 5);
        assert_eq!(rock.soldiers[0].id, "rock-0");
        assert!(rock.soldiers[0].is_leader);
        assert_eq!(rock.speed_multiplier, 1.0);
    }

    #[test]
    fn test_stats_average() {
        let mut stats = SnapshotStats::default();
        stats.record(10, 100);
        stats.record(20, 300);
        assert_eq!(stats.total_bytes, 400);
        assert!((stats.avg_soldiers_per_snapshot - 15.0).abs() < 1e-4);
    }
}
