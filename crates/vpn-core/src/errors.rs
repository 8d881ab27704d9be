//! Engine error taxonomy and error type constants for metrics and logging.
//!
//! Internal errors (ledger, adapter, credential) are mapped into
//! [`EngineError`] before they cross the engine boundary. The variants carry
//! only caller-safe text: raw driver or process output stays in the logs.

use crate::ids::Entitlement;

/// Uniqueness violation.
pub const ERROR_CONFLICT: &str = "conflict";
/// Missing row.
pub const ERROR_NOT_FOUND: &str = "not_found";
/// Credential rejected.
pub const ERROR_AUTH: &str = "auth";
/// Entitlement check failed.
pub const ERROR_NOT_ENTITLED: &str = "not_entitled";
/// Backend adapter failure.
pub const ERROR_ADAPTER: &str = "adapter";
/// Deadline exceeded.
pub const ERROR_TIMEOUT: &str = "timeout";
/// Malformed input.
pub const ERROR_INVALID_INPUT: &str = "invalid_input";
/// Store unavailable.
pub const ERROR_STORAGE: &str = "storage";
/// Configuration error.
pub const ERROR_CONFIG: &str = "config";

/// Error returned by every engine operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A unique field (username, email, external id, lease) is taken.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Identifier or password rejected.
    #[error("invalid credentials")]
    BadCredential,

    /// The user may not hold a session right now.
    #[error("not entitled: {0}")]
    NotEntitled(Entitlement),

    /// The user or external identity is already linked elsewhere.
    #[error("external identity already linked")]
    AlreadyLinked,

    /// The session was closed by an earlier call.
    #[error("session already closed")]
    AlreadyClosed,

    /// A backend credential could not be activated.
    #[error("provisioning failed: {0}")]
    ProvisionFailed(String),

    /// Backend I/O or process failure.
    #[error("adapter error: {0}")]
    Adapter(String),

    /// The operation exceeded its deadline.
    #[error("operation timed out")]
    Timeout,

    /// Malformed identifiers or usage values.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The ledger could not complete the operation.
    #[error("storage unavailable")]
    Unavailable,
}

impl EngineError {
    /// Create an invalid-input error from any displayable value.
    #[inline]
    pub fn invalid<E: std::fmt::Display>(err: E) -> Self {
        Self::InvalidInput(err.to_string())
    }

    /// Text safe to return to the caller.
    ///
    /// Identical to `Display`; variants never embed driver or process output.
    pub fn public_message(&self) -> String {
        self.to_string()
    }

    /// Metric/log label for this error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Conflict(_) | Self::AlreadyLinked => ERROR_CONFLICT,
            Self::NotFound(_) | Self::AlreadyClosed => ERROR_NOT_FOUND,
            Self::BadCredential => ERROR_AUTH,
            Self::NotEntitled(_) => ERROR_NOT_ENTITLED,
            Self::ProvisionFailed(_) | Self::Adapter(_) => ERROR_ADAPTER,
            Self::Timeout => ERROR_TIMEOUT,
            Self::InvalidInput(_) => ERROR_INVALID_INPUT,
            Self::Unavailable => ERROR_STORAGE,
        }
    }

    /// Whether a retry of the same request is harmless and may succeed.
    ///
    /// `AlreadyClosed` counts as benign: the earlier close already applied.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::AlreadyClosed)
    }
}
