//! Static arena geometry and the spatial queries the simulation runs against it

use rand::Rng;

use super::{Faction, Vec2};

/// Axis-aligned rectangle on the arena floor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min_x: f32,
    pub max_x: f32,
    pub min_z: f32,
    pub max_z: f32,
}

impl Rect {
    pub fn centered(center: Vec2, width: f32, depth: f32) -> Self {
        Self {
            min_x: center.x - width / 2.0,
            max_x: center.x + width / 2.0,
            min_z: center.z - depth / 2.0,
            max_z: center.z + depth / 2.0,
        }
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.z >= self.min_z && p.z <= self.max_z
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new((self.min_x + self.max_x) / 2.0, (self.min_z + self.max_z) / 2.0)
    }

    pub fn closest_point(&self, p: Vec2) -> Vec2 {
        Vec2::new(p.x.clamp(self.min_x, self.max_x), p.z.clamp(self.min_z, self.max_z))
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_z < other.max_z
            && other.min_z < self.max_z
    }
}

/// Circular floor zone that scales movement speed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleZone {
    pub center: Vec2,
    pub radius: f32,
    pub multiplier: f32,
}

impl CircleZone {
    pub fn contains(&self, p: Vec2) -> bool {
        let d = p - self.center;
        d.x * d.x + d.z * d.z <= self.radius * self.radius
    }
}

/// Result of a circle-vs-wall test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallHit {
    pub wall: usize,
    /// From the wall's closest point to the query point
    pub push: Vec2,
}

/// Radius used when rejecting power-up spawn points against walls
const POWER_UP_CLEARANCE: f32 = 1.5;
/// Power-ups stay this far inside the outer walls
const POWER_UP_MARGIN: f32 = 3.0;
const POWER_UP_SPAWN_ATTEMPTS: usize = 20;
const WALL_THICKNESS: f32 = 1.0;

/// Immutable per-match geometry
#[derive(Debug, Clone)]
pub struct Arena {
    /// Playable area spans -half_size..half_size on both axes
    pub half_size: f32,
    /// Clamp margin inside the bounds
    pub margin: f32,
    /// Indexed by `Faction::index`
    pub spawn_zones: [Rect; 3],
    pub neutral_zone: Rect,
    pub walls: Vec<Rect>,
    pub slow_zones: Vec<CircleZone>,
    pub speed_zones: Vec<CircleZone>,
}

impl Arena {
    /// The standard triangular layout: Rock at the bottom, Paper top-left,
    /// Scissors top-right, neutral zone in the middle.
    pub fn standard() -> Self {
        let half_size = 30.0;
        let t = WALL_THICKNESS;
        let walls = vec![
            // Boundary
            Rect {
                min_x: -half_size - t,
                max_x: half_size + t,
                min_z: -half_size - t,
                max_z: -half_size,
            },
            Rect {
                min_x: -half_size - t,
                max_x: half_size + t,
                min_z: half_size,
                max_z: half_size + t,
            },
            Rect { min_x: -half_size - t, max_x: -half_size, min_z: -half_size, max_z: half_size },
            Rect { min_x: half_size, max_x: half_size + t, min_z: -half_size, max_z: half_size },
            // Interior cover
            Rect::centered(Vec2::new(-10.0, -2.0), 1.0, 6.0),
            Rect::centered(Vec2::new(10.0, -2.0), 1.0, 6.0),
            Rect::centered(Vec2::new(0.0, 14.0), 6.0, 1.0),
        ];

        Self {
            half_size,
            margin: 1.0,
            spawn_zones: [
                Rect::centered(Vec2::new(0.0, -20.0), 10.0, 8.0),
                Rect::centered(Vec2::new(-17.0, 10.0), 10.0, 8.0),
                Rect::centered(Vec2::new(17.0, 10.0), 10.0, 8.0),
            ],
            neutral_zone: Rect::centered(Vec2::ZERO, 8.0, 8.0),
            walls,
            slow_zones: vec![
                CircleZone { center: Vec2::new(-14.0, -14.0), radius: 3.0, multiplier: 0.5 },
                CircleZone { center: Vec2::new(14.0, -14.0), radius: 3.0, multiplier: 0.5 },
                CircleZone { center: Vec2::new(0.0, 22.0), radius: 3.0, multiplier: 0.5 },
            ],
            speed_zones: vec![
                CircleZone { center: Vec2::new(0.0, -9.0), radius: 2.5, multiplier: 1.5 },
                CircleZone { center: Vec2::new(-8.0, 6.0), radius: 2.5, multiplier: 1.5 },
                CircleZone { center: Vec2::new(8.0, 6.0), radius: 2.5, multiplier: 1.5 },
            ],
        }
    }

    pub fn spawn_zone(&self, faction: Faction) -> &Rect {
        &self.spawn_zones[faction.index()]
    }

    pub fn is_in_neutral_zone(&self, p: Vec2) -> bool {
        self.neutral_zone.contains(p)
    }

    pub fn is_in_spawn_zone(&self, p: Vec2, faction: Faction) -> bool {
        self.spawn_zone(faction).contains(p)
    }

    /// Circle-vs-rectangle against every wall; first hit wins
    pub fn check_wall_collision(&self, p: Vec2, radius: f32) -> Option<WallHit> {
        self.walls.iter().enumerate().find_map(|(i, wall)| {
            let push = p - wall.closest_point(p);
            if push.x * push.x + push.z * push.z < radius * radius {
                Some(WallHit { wall: i, push })
            } else {
                None
            }
        })
    }

    /// Floor speed multiplier; speed zones win over slow zones on overlap
    pub fn slow_multiplier(&self, p: Vec2) -> f32 {
        if let Some(zone) = self.speed_zones.iter().find(|z| z.contains(p)) {
            return zone.multiplier;
        }
        if let Some(zone) = self.slow_zones.iter().find(|z| z.contains(p)) {
            return zone.multiplier;
        }
        1.0
    }

    /// Keep a point inside the outer walls minus the margin
    pub fn clamp_to_bounds(&self, p: Vec2) -> Vec2 {
        let limit = self.half_size - self.margin;
        Vec2::new(p.x.clamp(-limit, limit), p.z.clamp(-limit, limit))
    }

    pub fn center(&self) -> Vec2 {
        Vec2::ZERO
    }

    /// Rejection-sample a wall-free point; falls back to the center
    pub fn random_power_up_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec2 {
        let limit = self.half_size - POWER_UP_MARGIN;
        for _ in 0..POWER_UP_SPAWN_ATTEMPTS {
            let candidate = Vec2::new(rng.gen_range(-limit..limit), rng.gen_range(-limit..limit));
            if self.check_wall_collision(candidate, POWER_UP_CLEARANCE).is_none() {
                return candidate;
            }
        }
        self.center()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::standard()
    }
}
