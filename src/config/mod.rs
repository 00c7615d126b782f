//! Configuration module - environment variable parsing and gameplay tunables

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// What this process does
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Serve the party relay
    Relay,
    /// Headless solo match against AI armies
    Solo,
    /// Create a party on the relay and run the authoritative simulation
    Host,
    /// Join an existing party as a mirror
    Join,
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relay" => Ok(Self::Relay),
            "solo" => Ok(Self::Solo),
            "host" => Ok(Self::Host),
            "join" => Ok(Self::Join),
            _ => Err(ConfigError::Invalid("ARENA_MODE")),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub mode: RunMode,
    /// Relay binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed browser origins for the relay (comma-separated), any if unset
    pub client_origin: Option<String>,
    /// Relay admission cap per party
    pub relay_max_peers: usize,

    /// Relay base URL used by host/join peers
    pub relay_url: String,
    /// Party to join (join mode)
    pub party_code: Option<String>,
    /// Stable local user id
    pub player_id: String,
    /// Display name
    pub player_name: String,
    /// Bounded transport retry count
    pub connect_attempts: u32,
    /// Connected players a headless host waits for before starting
    pub min_players: usize,
    /// Match RNG seed
    pub match_seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            mode: env::var("ARENA_MODE")
                .unwrap_or_else(|_| "relay".to_string())
                .parse()?,
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").ok(),
            relay_max_peers: parse_or("RELAY_MAX_PEERS", 8)?,

            relay_url: env::var("RELAY_URL").unwrap_or_else(|_| "ws://127.0.0.1:8080".to_string()),
            party_code: env::var("PARTY_CODE").ok(),
            player_id: env::var("PLAYER_ID").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string()),
            player_name: env::var("PLAYER_NAME").unwrap_or_else(|_| "Player".to_string()),
            connect_attempts: parse_or("CONNECT_ATTEMPTS", 5)?,
            min_players: parse_or("MIN_PLAYERS", 2)?,
            match_seed: env::var("MATCH_SEED")
                .ok()
                .map(|s| s.parse().map_err(|_| ConfigError::Invalid("MATCH_SEED")))
                .transpose()?,
        })
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

/// Gameplay tunables. Durations are in seconds and converted to ticks
/// where they are scheduled.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub soldiers_per_army: usize,
    /// Reinforcement never grows an army past this
    pub max_roster: usize,
    pub formation_spacing: f32,
    pub soldier_radius: f32,

    pub base_speed: f32,
    /// Roster size above which the blob slows down
    pub nominal_roster: usize,
    pub size_penalty_per_soldier: f32,
    pub min_size_multiplier: f32,
    pub follow_distance: f32,
    pub follow_smoothing: f32,

    pub conversion_secs: f32,
    pub placement_secs: f32,

    pub power_up_interval_secs: f32,
    pub power_up_variance_secs: f32,
    pub pickup_radius: f32,
    pub speed_boost_multiplier: f32,
    pub speed_boost_secs: f32,
    pub invincibility_secs: f32,
    pub soldiers_to_restore: usize,
    pub magnet_secs: f32,
    pub magnet_range: f32,
    pub magnet_pull_speed: f32,
    pub split_impulse: f32,
    pub clone_secs: f32,
    pub reverse_secs: f32,

    pub ai_threat_radius: f32,
    pub ai_wander_secs: f32,

    /// Fraction of the remaining error closed per game_state
    pub reconcile_lerp: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            soldiers_per_army: 5,
            max_roster: 5,
            formation_spacing: 1.5,
            soldier_radius: 0.5,

            base_speed: 8.0,
            nominal_roster: 5,
            size_penalty_per_soldier: 0.04,
            min_size_multiplier: 0.5,
            follow_distance: 1.2,
            follow_smoothing: 0.9,

            conversion_secs: 0.5,
            placement_secs: 10.0,

            power_up_interval_secs: 8.0,
            power_up_variance_secs: 3.0,
            pickup_radius: 1.5,
            speed_boost_multiplier: 1.6,
            speed_boost_secs: 5.0,
            invincibility_secs: 5.0,
            soldiers_to_restore: 2,
            magnet_secs: 6.0,
            magnet_range: 8.0,
            magnet_pull_speed: 3.0,
            split_impulse: 4.0,
            clone_secs: 6.0,
            reverse_secs: 4.0,

            ai_threat_radius: 8.0,
            ai_wander_secs: 2.0,

            reconcile_lerp: 0.3,
        }
    }
}
