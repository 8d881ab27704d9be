//! Backend adapter error types.

use vpn_core::EngineError;

/// Error raised by a backend adapter.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// A control tool could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A control tool exited unsuccessfully.
    #[error("{program} exited with {code:?}: {stderr}")]
    Command {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The daemon did not accept the reload signal.
    #[error("reload failed: {0}")]
    Reload(String),

    /// The daemon is not reachable right now.
    #[error("daemon unavailable: {0}")]
    Unavailable(String),

    /// The call exceeded its deadline.
    #[error("adapter call timed out")]
    Timeout,

    /// Configuration document I/O failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration document could not be parsed or produced.
    #[error("config document: {0}")]
    Document(String),

    /// The credential is not acceptable to the backend.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
}

impl AdapterError {
    /// Whether one more attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Reload(_) | Self::Unavailable(_) | Self::Timeout)
    }

    #[inline]
    pub fn document<E: std::fmt::Display>(err: E) -> Self {
        Self::Document(err.to_string())
    }
}

impl From<AdapterError> for EngineError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Timeout => EngineError::Timeout,
            // Tool output stays in the logs.
            other => {
                tracing::error!(error = %other, "backend adapter failure");
                EngineError::Adapter("backend did not accept the change".into())
            }
        }
    }
}
