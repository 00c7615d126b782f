//! Army movement: input normalisation, leader steering, follow chain, wall sliding

use crate::config::SimConfig;

use super::arena::Arena;
use super::army::Army;
use super::Vec2;

/// Directional keys currently held
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeldDirections {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl HeldDirections {
    /// Movement vector with diagonal speed equal to axial speed.
    /// Up is -z (away from the camera).
    pub fn to_vector(self) -> Vec2 {
        let x = (self.right as i8 - self.left as i8) as f32;
        let z = (self.down as i8 - self.up as i8) as f32;
        let v = Vec2::new(x, z);
        if x != 0.0 && z != 0.0 {
            v.normalized_or_zero()
        } else {
            v
        }
    }
}

/// Movement system for leaders and their followers
pub struct MovementSystem;

impl MovementSystem {
    /// Speed multiplier for large armies; one step down per soldier above nominal
    pub fn size_penalty(soldier_count: usize, cfg: &SimConfig) -> f32 {
        let excess = soldier_count.saturating_sub(cfg.nominal_roster) as f32;
        (1.0 - excess * cfg.size_penalty_per_soldier).max(cfg.min_size_multiplier)
    }

    /// base * size penalty * floor zone * active speed boost
    pub fn effective_speed(army: &Army, arena: &Arena, tick: u64, cfg: &SimConfig) -> f32 {
        let zone = army
            .leader_position()
            .map(|p| arena.slow_multiplier(p))
            .unwrap_or(1.0);
        cfg.base_speed
            * Self::size_penalty(army.len(), cfg)
            * zone
            * army.status.speed_multiplier(tick)
    }

    /// Cancel the axis with the larger wall penetration (axis-locked slide),
    /// then clamp to the arena bounds.
    pub fn slide(arena: &Arena, from: Vec2, to: Vec2, radius: f32) -> Vec2 {
        let mut next = to;
        if let Some(hit) = arena.check_wall_collision(next, radius) {
            let (px, pz) = (hit.push.x.abs(), hit.push.z.abs());
            if px > pz {
                next.x = from.x;
            } else if pz > px {
                next.z = from.z;
            } else {
                next = from;
            }
            // Corners can still overlap after one axis is cancelled
            if arena.check_wall_collision(next, radius).is_some() {
                next = from;
            }
        }
        arena.clamp_to_bounds(next)
    }

    /// Move the leader by `input * speed * dt`. Reversed control negates the input.
    pub fn move_leader(
        army: &mut Army,
        input: Vec2,
        speed: f32,
        dt: f32,
        arena: &Arena,
        tick: u64,
        cfg: &SimConfig,
    ) {
        let input = if army.status.is_reversed(tick) { -input } else { input };
        if input.is_zero() {
            return;
        }
        let Some(leader) = army.soldiers_mut().first_mut() else {
            return;
        };
        let from = leader.position;
        leader.position = Self::slide(arena, from, from + input * (speed * dt), cfg.soldier_radius);
    }

    /// Each follower chases the soldier ahead of it in the chain
    pub fn follow_chain(army: &mut Army, speed: f32, dt: f32, arena: &Arena, cfg: &SimConfig) {
        let soldiers = army.soldiers_mut();
        for i in 1..soldiers.len() {
            let target = soldiers[i - 1].position;
            let current = soldiers[i].position;
            let offset = target - current;
            let distance = offset.length();
            if distance <= cfg.follow_distance {
                continue;
            }
            let excess = distance - cfg.follow_distance;
            let step = (speed * cfg.follow_smoothing * (1.0 + excess) * dt).min(excess);
            let next = current + offset.normalized_or_zero() * step;
            soldiers[i].position = Self::slide(arena, current, next, cfg.soldier_radius);
        }
    }
}
