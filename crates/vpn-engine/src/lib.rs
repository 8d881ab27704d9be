//! Engine facade for vpn-rs.
//!
//! [`Engine`] wires the ledger, identity, provisioning and session services
//! together from a [`vpn_config::Config`] and exposes the operations the
//! routing layer calls. The [`cli`] module runs it as a service and the
//! [`admin`] module provides operator commands.

mod engine;
mod error;

pub mod admin;
pub mod cli;

#[cfg(test)]
mod tests;

pub use admin::{AdminCommands, ConfigArgs};
pub use cli::{EngineArgs, init_tracing};
pub use engine::Engine;
pub use error::StartError;
pub use tokio_util::sync::CancellationToken;
