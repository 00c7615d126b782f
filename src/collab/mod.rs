//! Collaborator services around the simulation: identity, audio, input
//! and presentation. Each is constructed explicitly and handed to the
//! runtime; none of them can mutate the match.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::config::Config;
use crate::game::ai::{AiBrain, AiPolicy};
use crate::game::view::RenderView;
use crate::game::{Faction, MatchPhase, MatchState, Vec2};
use crate::net::NetError;

pub use crate::game::movement::HeldDirections;

/// Stable local user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Result<Self, NetError> {
        let username = username.into().trim().to_string();
        if username.is_empty() {
            return Err(NetError::EmptyUsername);
        }
        Ok(Self {
            user_id: user_id.into(),
            username,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, NetError> {
        Self::new(config.player_id.clone(), config.player_name.clone())
    }
}

/// Named audio triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundCue {
    Click,
    Error,
    Convert,
    PowerUp,
    Victory,
    CountdownTick,
}

/// Fire-and-forget audio output
pub trait AudioSink: Send {
    fn play(&mut self, cue: SoundCue);
}

/// Writes cues to the log
#[derive(Debug, Default)]
pub struct LogAudio;

impl AudioSink for LogAudio {
    fn play(&mut self, cue: SoundCue) {
        debug!(cue = ?cue, "Sound cue");
    }
}

/// Source of the local movement vector
pub trait InputSource: Send {
    fn movement(&mut self, state: &MatchState) -> Vec2;
}

impl InputSource for HeldDirections {
    fn movement(&mut self, _state: &MatchState) -> Vec2 {
        self.to_vector()
    }
}

/// Steers the local army with the AI policy (headless peers)
pub struct Autopilot {
    brain: AiBrain,
    rng: ChaCha8Rng,
}

impl Autopilot {
    pub fn new(seed: u64) -> Self {
        Self {
            brain: AiBrain::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl InputSource for Autopilot {
    fn movement(&mut self, state: &MatchState) -> Vec2 {
        let Some(faction) = state.local_faction else {
            return Vec2::ZERO;
        };
        if state.phase != MatchPhase::Playing {
            return Vec2::ZERO;
        }
        let (_, direction) = AiPolicy::decide(
            faction,
            &state.armies,
            &mut self.brain,
            state.tick,
            &mut self.rng,
            &state.config,
        );
        direction
    }
}

/// Consumes the read-only view every tick
pub trait Presenter: Send {
    fn present(&mut self, view: &RenderView);
}

/// Logs phase changes and army counts as they change
#[derive(Debug, Default)]
pub struct LogPresenter {
    last_phase: Option<MatchPhase>,
    last_counts: Vec<(Faction, usize)>,
}

impl Presenter for LogPresenter {
    fn present(&mut self, view: &RenderView) {
        if self.last_phase != Some(view.phase) {
            match view.phase {
                MatchPhase::Ended => info!(
                    winner = ?view.winner,
                    final_count = view.final_count.unwrap_or(0),
                    "Match over"
                ),
                phase => info!(phase = ?phase, "Phase"),
            }
            self.last_phase = Some(view.phase);
        }

        let counts: Vec<(Faction, usize)> =
            view.armies.iter().map(|(f, a)| (*f, a.count)).collect();
        if counts != self.last_counts && view.phase == MatchPhase::Playing {
            info!(
                rock = view.count(Faction::Rock),
                paper = view.count(Faction::Paper),
                scissors = view.count(Faction::Scissors),
                "Army counts"
            );
        }
        self.last_counts = counts;
    }
}

/// Everything the runtime talks to outside the simulation
pub struct Collaborators {
    pub identity: Identity,
    pub audio: Box<dyn AudioSink>,
    pub input: Box<dyn InputSource>,
    pub presenter: Box<dyn Presenter>,
}

impl Collaborators {
    pub fn init(
        identity: Identity,
        audio: Box<dyn AudioSink>,
        input: Box<dyn InputSource>,
        presenter: Box<dyn Presenter>,
    ) -> Self {
        info!(user_id = %identity.user_id, username = %identity.username, "Collaborators ready");
        Self {
            identity,
            audio,
            input,
            presenter,
        }
    }

    /// Log audio, log presenter, autopilot input
    pub fn headless(identity: Identity, seed: u64) -> Self {
        Self::init(
            identity,
            Box::new(LogAudio),
            Box::new(Autopilot::new(seed)),
            Box::new(LogPresenter::default()),
        )
    }

    pub fn teardown(self) {
        info!(user_id = %self.identity.user_id, "Collaborators torn down");
    }
}
