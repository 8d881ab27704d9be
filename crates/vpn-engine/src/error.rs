//! Startup error type.

use vpn_config::ConfigError;
use vpn_core::EngineError;
use vpn_identity::CredentialError;
use vpn_ledger::LedgerError;

/// Failure while bringing the engine up. Fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("credentials: {0}")]
    Credential(#[from] CredentialError),

    #[error("backend: {0}")]
    Backend(String),

    #[error("{0}")]
    Engine(#[from] EngineError),
}
