//! # vpn-rs
//!
//! Provisioning and accounting engine for a subscription VPN service.
//!
//! ## Crates
//!
//! - [`vpn_core`] - Identifiers, entitlement, errors and defaults
//! - [`vpn_config`] - Configuration loading and validation
//! - [`vpn_ledger`] - SQL ledger of users, tariffs, payments, sessions and bindings
//! - [`vpn_identity`] - Registration, credentials and subscriptions
//! - [`vpn_provision`] - WireGuard and proxy endpoint provisioning
//! - [`vpn_session`] - Connect, disconnect and usage accounting
//! - [`vpn_metrics`] - Prometheus-compatible metrics
//! - [`vpn_engine`] - Engine facade, service runner and admin CLI

pub use vpn_config as config;
pub use vpn_core as core;
pub use vpn_engine as engine;
pub use vpn_identity as identity;
pub use vpn_ledger as ledger;
pub use vpn_metrics as metrics;
pub use vpn_provision as provision;
pub use vpn_session as session;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use vpn_config::{Config, load_config, validate_config};
    pub use vpn_core::{BackendKind, EngineError, Entitlement, SessionId, UserId};
    pub use vpn_engine::{CancellationToken, Engine, StartError};
    pub use vpn_provision::BackendAdapter;
}
