//! Core types and constants shared across vpn-rs crates.
//!
//! This crate provides:
//! - Default configuration values
//! - The engine error taxonomy seen by callers
//! - Typed identifiers and the entitlement state
//! - A keyed async mutex used for per-user serialization

pub mod defaults;
pub mod errors;
pub mod ids;
pub mod lock;

// Re-export commonly used items at crate root
pub use defaults::*;
pub use errors::*;
pub use ids::{BackendKind, Entitlement, PaymentId, SessionId, TariffId, UserId};
pub use lock::KeyedMutex;

/// Project name.
pub const PROJECT_NAME: &str = "vpn-rs";
/// Project version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current Unix timestamp in seconds.
#[inline]
#[allow(clippy::cast_possible_wrap)]
pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
