//! Soldiers and the army roster that owns them

use super::{Faction, Vec2};

/// A single soldier. `id` is the join key across peers and never changes,
/// including when the soldier is converted to another faction.
#[derive(Debug, Clone, PartialEq)]
pub struct Soldier {
    pub id: String,
    pub faction: Faction,
    pub is_leader: bool,
    pub position: Vec2,
    /// Mid conversion animation: excluded from collisions and further conversion
    pub is_converting: bool,
    /// Being dragged during placement
    pub is_dragging: bool,
}

impl Soldier {
    pub fn new(id: impl Into<String>, faction: Faction, position: Vec2) -> Self {
        Self {
            id: id.into(),
            faction,
            is_leader: false,
            position,
            is_converting: false,
            is_dragging: false,
        }
    }

    /// Flip the faction tag in place; identity is preserved
    pub fn change_faction(&mut self, faction: Faction) {
        self.faction = faction;
    }
}

/// Timed status effects, stored as the tick at which each one expires
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEffects {
    pub invincible_until: Option<u64>,
    pub speed_multiplier: f32,
    pub speed_until: Option<u64>,
    pub reversed_until: Option<u64>,
    pub magnet_until: Option<u64>,
}

impl Default for StatusEffects {
    fn default() -> Self {
        Self {
            invincible_until: None,
            speed_multiplier: 1.0,
            speed_until: None,
            reversed_until: None,
            magnet_until: None,
        }
    }
}

/// Mirrors have no expiry information, only flags; a flag holds until the
/// next authoritative update overwrites it.
const HELD: Option<u64> = Some(u64::MAX);

fn active(until: Option<u64>, tick: u64) -> bool {
    until.is_some_and(|t| tick < t)
}

fn remaining(until: Option<u64>, tick: u64) -> Option<u64> {
    until.filter(|&t| tick < t && t != u64::MAX).map(|t| t - tick)
}

impl StatusEffects {
    pub fn is_invincible(&self, tick: u64) -> bool {
        active(self.invincible_until, tick)
    }

    pub fn is_reversed(&self, tick: u64) -> bool {
        active(self.reversed_until, tick)
    }

    pub fn has_magnet(&self, tick: u64) -> bool {
        active(self.magnet_until, tick)
    }

    pub fn speed_multiplier(&self, tick: u64) -> f32 {
        if active(self.speed_until, tick) {
            self.speed_multiplier
        } else {
            1.0
        }
    }

    pub fn invincible_remaining(&self, tick: u64) -> Option<u64> {
        remaining(self.invincible_until, tick)
    }

    pub fn speed_remaining(&self, tick: u64) -> Option<u64> {
        remaining(self.speed_until, tick)
    }

    pub fn reversed_remaining(&self, tick: u64) -> Option<u64> {
        remaining(self.reversed_until, tick)
    }

    pub fn magnet_remaining(&self, tick: u64) -> Option<u64> {
        remaining(self.magnet_until, tick)
    }

    /// Clear everything that has expired by `tick`.
    /// Returns which effects ended: (speed, invincible, reversed, magnet).
    pub fn expire(&mut self, tick: u64) -> [bool; 4] {
        let mut ended = [false; 4];
        if self.speed_until.is_some_and(|t| tick >= t) {
            self.speed_until = None;
            self.speed_multiplier = 1.0;
            ended[0] = true;
        }
        if self.invincible_until.is_some_and(|t| tick >= t) {
            self.invincible_until = None;
            ended[1] = true;
        }
        if self.reversed_until.is_some_and(|t| tick >= t) {
            self.reversed_until = None;
            ended[2] = true;
        }
        if self.magnet_until.is_some_and(|t| tick >= t) {
            self.magnet_until = None;
            ended[3] = true;
        }
        ended
    }

    /// Overwrite from an authoritative snapshot
    pub fn set_mirrored(
        &mut self,
        invincible: bool,
        speed_multiplier: f32,
        reversed: bool,
        magnet: bool,
    ) {
        self.invincible_until = if invincible { HELD } else { None };
        self.reversed_until = if reversed { HELD } else { None };
        self.magnet_until = if magnet { HELD } else { None };
        if (speed_multiplier - 1.0).abs() > f32::EPSILON {
            self.speed_multiplier = speed_multiplier;
            self.speed_until = HELD;
        } else {
            self.speed_multiplier = 1.0;
            self.speed_until = None;
        }
    }
}

/// One faction's roster. Insertion order is follow-chain order and the
/// first soldier is always the leader.
#[derive(Debug, Clone)]
pub struct Army {
    pub faction: Faction,
    soldiers: Vec<Soldier>,
    /// Index of the leader, recomputed on every structural change
    leader: Option<usize>,
    pub status: StatusEffects,
    next_reinforcement: u32,
}

impl Army {
    /// Build an army of `count` soldiers: a leader at `anchor` and followers
    /// on a ring around it.
    pub fn new(faction: Faction, count: usize, anchor: Vec2, spacing: f32) -> Self {
        let followers = count.saturating_sub(1);
        let soldiers = (0..count)
            .map(|i| {
                let position = if i == 0 {
                    anchor
                } else {
                    let angle = std::f32::consts::TAU * (i - 1) as f32 / followers as f32;
                    anchor + Vec2::from_angle(angle) * spacing
                };
                Soldier::new(format!("{}-{}", faction, i), faction, position)
            })
            .collect();
        Self::from_soldiers(faction, soldiers)
    }

    pub fn from_soldiers(faction: Faction, soldiers: Vec<Soldier>) -> Self {
        let mut army = Self {
            faction,
            soldiers,
            leader: None,
            status: StatusEffects::default(),
            next_reinforcement: 0,
        };
        army.refresh_leader();
        army
    }

    fn refresh_leader(&mut self) {
        self.leader = if self.soldiers.is_empty() { None } else { Some(0) };
        for (i, soldier) in self.soldiers.iter_mut().enumerate() {
            soldier.is_leader = i == 0;
        }
    }

    /// Remove by id. A removed leader is replaced by the new first soldier.
    pub fn remove_soldier(&mut self, soldier_id: &str) -> Option<Soldier> {
        let idx = self.soldiers.iter().position(|s| s.id == soldier_id)?;
        let mut soldier = self.soldiers.remove(idx);
        soldier.is_leader = false;
        self.refresh_leader();
        Some(soldier)
    }

    /// Append to the tail of the follow chain
    pub fn add_soldier(&mut self, soldier: Soldier) {
        self.soldiers.push(soldier);
        self.refresh_leader();
    }

    /// Replace the whole roster (order is the new follow-chain order)
    pub fn set_soldiers(&mut self, soldiers: Vec<Soldier>) {
        self.soldiers = soldiers;
        self.refresh_leader();
    }

    pub fn take_soldiers(&mut self) -> Vec<Soldier> {
        let soldiers = std::mem::take(&mut self.soldiers);
        self.refresh_leader();
        soldiers
    }

    pub fn next_reinforcement_id(&mut self) -> String {
        let id = format!("{}-r{}", self.faction, self.next_reinforcement);
        self.next_reinforcement += 1;
        id
    }

    pub fn leader(&self) -> Option<&Soldier> {
        self.leader.and_then(|i| self.soldiers.get(i))
    }

    pub fn leader_position(&self) -> Option<Vec2> {
        self.leader().map(|s| s.position)
    }

    pub fn soldiers(&self) -> &[Soldier] {
        &self.soldiers
    }

    pub fn soldiers_mut(&mut self) -> &mut [Soldier] {
        &mut self.soldiers
    }

    pub fn get(&self, soldier_id: &str) -> Option<&Soldier> {
        self.soldiers.iter().find(|s| s.id == soldier_id)
    }

    pub fn get_mut(&mut self, soldier_id: &str) -> Option<&mut Soldier> {
        self.soldiers.iter_mut().find(|s| s.id == soldier_id)
    }

    pub fn len(&self) -> usize {
        self.soldiers.len()
    }

    /// No soldiers left; excluded from collisions and the win check but
    /// still addressable
    pub fn is_eliminated(&self) -> bool {
        self.soldiers.is_empty()
    }
}
