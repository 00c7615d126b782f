//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::ws::PartyRegistry;

/// Shared relay state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub parties: Arc<PartyRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let parties = Arc::new(PartyRegistry::new(config.relay_max_peers));
        Self {
            config: Arc::new(config),
            parties,
        }
    }
}
