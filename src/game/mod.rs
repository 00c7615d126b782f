//! Game simulation modules

pub mod ai;
pub mod arena;
pub mod army;
pub mod conversion;
pub mod faction;
pub mod r#match;
pub mod movement;
pub mod powerup;
pub mod view;

pub use arena::Arena;
pub use army::{Army, Soldier};
pub use faction::Faction;
pub use powerup::PowerUpKind;
pub use r#match::{MatchOutcome, MatchPhase, MatchState};

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// Position or direction on the arena floor (x, z)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub z: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, z: 0.0 };

    pub const fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.z * self.z).sqrt()
    }

    pub fn distance(self, other: Vec2) -> f32 {
        (other - self).length()
    }

    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.z == 0.0
    }

    /// Unit vector in the same direction, or zero for a (near) zero vector
    pub fn normalized_or_zero(self) -> Vec2 {
        let len = self.length();
        if len < 1e-6 {
            Vec2::ZERO
        } else {
            Vec2::new(self.x / len, self.z / len)
        }
    }

    /// Scale down to unit length if longer, leave shorter vectors alone
    pub fn clamp_length(self, max: f32) -> Vec2 {
        let len = self.length();
        if len > max && len > 0.0 {
            self * (max / len)
        } else {
            self
        }
    }

    pub fn from_angle(angle: f32) -> Vec2 {
        Vec2::new(angle.cos(), angle.sin())
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.z + rhs.z)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.z += rhs.z;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.z * rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.z)
    }
}

/// Things that happened during a simulation tick. The peer runtime turns
/// these into protocol messages and audio cues.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    PhaseChanged {
        phase: MatchPhase,
    },
    /// Whole second boundary crossed during placement
    CountdownTick {
        seconds_remaining: u32,
    },
    ConversionStarted {
        soldier_id: String,
        from: Faction,
        to: Faction,
    },
    /// Soldier moved rosters; mirrors receive this as a `conversion` message
    Converted {
        soldier_id: String,
        from: Faction,
        to: Faction,
    },
    PowerUpSpawned {
        id: u32,
        kind: PowerUpKind,
        position: Vec2,
    },
    PowerUpCollected {
        id: u32,
        kind: PowerUpKind,
        faction: Faction,
    },
    EffectExpired {
        faction: Faction,
        kind: PowerUpKind,
    },
    MatchEnded {
        winner: Option<Faction>,
    },
}

/// Simulation errors (programmatic misuse only; player input never errors)
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SimError {
    #[error("Illegal phase transition from {from:?} to {to:?}")]
    IllegalTransition { from: MatchPhase, to: MatchPhase },
}
