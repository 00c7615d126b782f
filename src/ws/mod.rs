//! Party relay over WebSocket

pub mod handler;
pub mod party;

pub use party::PartyRegistry;
