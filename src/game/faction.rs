//! The three factions and their dominance cycle

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    Rock,
    Paper,
    Scissors,
}

impl Faction {
    /// Fixed iteration order used everywhere determinism matters
    pub const ALL: [Faction; 3] = [Faction::Rock, Faction::Paper, Faction::Scissors];

    /// Order in which a host hands factions to joiners (Rock is the host's)
    pub const JOIN_ORDER: [Faction; 2] = [Faction::Paper, Faction::Scissors];

    /// Rock beats Scissors, Scissors beats Paper, Paper beats Rock
    pub fn beats(self, other: Faction) -> bool {
        matches!(
            (self, other),
            (Faction::Rock, Faction::Scissors)
                | (Faction::Scissors, Faction::Paper)
                | (Faction::Paper, Faction::Rock)
        )
    }

    /// The faction this one beats
    pub fn prey(self) -> Faction {
        match self {
            Faction::Rock => Faction::Scissors,
            Faction::Paper => Faction::Rock,
            Faction::Scissors => Faction::Paper,
        }
    }

    /// The faction that beats this one
    pub fn predator(self) -> Faction {
        match self {
            Faction::Rock => Faction::Paper,
            Faction::Paper => Faction::Scissors,
            Faction::Scissors => Faction::Rock,
        }
    }

    pub fn others(self) -> [Faction; 2] {
        [self.prey(), self.predator()]
    }

    pub fn index(self) -> usize {
        match self {
            Faction::Rock => 0,
            Faction::Paper => 1,
            Faction::Scissors => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Faction::Rock => "rock",
            Faction::Paper => "paper",
            Faction::Scissors => "scissors",
        }
    }
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Winner of an encounter between two factions; `None` for same-faction pairs
pub fn dominance(a: Faction, b: Faction) -> Option<Faction> {
    if a.beats(b) {
        Some(a)
    } else if b.beats(a) {
        Some(b)
    } else {
        None
    }
}
