//! Shared utilities

pub mod party_code;
pub mod rate_limit;
pub mod time;
