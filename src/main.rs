//! RPS Arena - three-faction rock/paper/scissors army battles
//!
//! One binary, four modes selected by `ARENA_MODE`:
//! - `relay`: the party relay that stamps and fans out peer messages
//! - `solo`: a headless match against two AI armies
//! - `host`: opens a party and runs the authoritative simulation
//! - `join`: joins a party and mirrors the host

mod app;
mod collab;
mod config;
mod game;
mod http;
mod net;
mod util;
mod ws;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::collab::{Collaborators, Identity};
use crate::config::{Config, ConfigError, RunMode, SimConfig};
use crate::http::build_router;
use crate::net::runtime::RunEnd;
use crate::net::transport::connect_ws;
use crate::net::{NetworkSession, PeerRuntime};
use crate::util::party_code;
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    init_tracing(&config.log_level);
    init_server_time();

    info!(mode = ?config.mode, "Starting RPS Arena");

    match config.mode {
        RunMode::Relay => run_relay(config).await,
        RunMode::Solo | RunMode::Host | RunMode::Join => run_peer(config).await,
    }
}

async fn run_relay(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config.server_addr;
    let router = build_router(AppState::new(config));
    let listener = TcpListener::bind(addr).await?;

    info!("Relay listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("Party endpoint: ws://{}/party/{{code}}?userId={{id}}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Relay shutdown complete");
    Ok(())
}

async fn run_peer(config: Config) -> anyhow::Result<()> {
    let identity = Identity::from_config(&config)?;
    let seed = config.match_seed.unwrap_or_else(rand::random);
    let sim = SimConfig::default();
    let collab = Collaborators::headless(identity.clone(), seed);

    let runtime = match config.mode {
        RunMode::Solo => PeerRuntime::solo(sim, seed, collab)?,
        RunMode::Host => {
            let code = party_code::generate(&mut rand::thread_rng());
            info!(party = %code, "Opening party");
            let transport =
                connect_ws(&config.relay_url, &code, &identity.user_id, config.connect_attempts)
                    .await?;
            let session = NetworkSession::host(&identity, code);
            PeerRuntime::host(session, transport, sim, seed, config.min_players, collab)
        }
        RunMode::Join => {
            let raw = config
                .party_code
                .as_deref()
                .ok_or(ConfigError::Missing("PARTY_CODE"))?;
            let code = party_code::normalize(raw)?;
            info!(party = %code, "Joining party");
            let transport =
                connect_ws(&config.relay_url, &code, &identity.user_id, config.connect_attempts)
                    .await?;
            let session = NetworkSession::join(&identity, code);
            PeerRuntime::client(session, transport, sim, seed, collab)
        }
        RunMode::Relay => anyhow::bail!("relay mode does not run a peer"),
    };

    match runtime.run(shutdown_signal()).await {
        RunEnd::Completed(outcome) => info!(
            winner = ?outcome.winner,
            final_count = outcome.final_count,
            "Match complete"
        ),
        RunEnd::Disconnected => warn!("Lost the party"),
        RunEnd::Rejected => warn!("Party is full"),
        RunEnd::Shutdown => info!("Peer shutdown complete"),
    }
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
