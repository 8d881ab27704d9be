//! Credential service error types.

use vpn_core::EngineError;

/// Error raised while hashing passwords or signing tokens.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Password hashing failed.
    #[error("password hashing failed: {0}")]
    Hash(String),

    /// Token could not be signed.
    #[error("token signing failed: {0}")]
    Token(String),

    /// Service parameters rejected at construction.
    #[error("invalid credential parameters: {0}")]
    Params(String),
}

impl CredentialError {
    #[inline]
    pub fn hash<E: std::fmt::Display>(err: E) -> Self {
        Self::Hash(err.to_string())
    }

    #[inline]
    pub fn token<E: std::fmt::Display>(err: E) -> Self {
        Self::Token(err.to_string())
    }
}

impl From<CredentialError> for EngineError {
    fn from(err: CredentialError) -> Self {
        // An internal fault, never the caller's input.
        tracing::error!(error = %err, "credential service failure");
        EngineError::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_failure_is_internal() {
        let err = EngineError::from(CredentialError::hash("out of memory"));
        assert_eq!(err, EngineError::Unavailable);
        assert!(!err.public_message().contains("out of memory"));
    }
}
