//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified messages per second
pub fn create_limiter(messages_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(messages_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Relay inbound limit per peer. A host sends 30 game_state/s plus bursts of
/// conversion messages, so this sits well above the sync rate.
pub const RELAY_MESSAGE_RATE_LIMIT: u32 = 120;

/// Per-peer rate limiter state
#[derive(Clone)]
pub struct PeerRateLimiter {
    message_limiter: Arc<Limiter>,
}

impl PeerRateLimiter {
    pub fn new() -> Self {
        Self {
            message_limiter: create_limiter(RELAY_MESSAGE_RATE_LIMIT),
        }
    }

    /// Check if a relayed message is allowed (returns true if allowed)
    pub fn check_message(&self) -> bool {
        self.message_limiter.check().is_ok()
    }
}

impl Default for PeerRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
