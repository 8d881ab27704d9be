//! Ledger error types.

use vpn_core::EngineError;

/// Error returned by ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A uniqueness constraint rejected the write.
    #[error("unique constraint violated: {constraint}")]
    Conflict { constraint: String },

    /// The addressed row does not exist.
    #[error("row not found")]
    NotFound,

    /// Waiting for a pooled connection timed out.
    #[error("database pool timed out")]
    Timeout,

    /// Any other driver failure.
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// A stored value could not be decoded into its typed form.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl LedgerError {
    /// Create a corrupt-row error from any displayable value.
    #[inline]
    pub fn corrupt<E: std::fmt::Display>(err: E) -> Self {
        Self::Corrupt(err.to_string())
    }

    /// Whether a uniqueness constraint mentioning `needle` was violated.
    ///
    /// PostgreSQL reports the constraint name (`users_email_key`); SQLite only
    /// reports the columns (`UNIQUE constraint failed: users.email`). Both
    /// contain the column name.
    pub fn is_conflict_on(&self, needle: &str) -> bool {
        matches!(self, Self::Conflict { constraint } if constraint.contains(needle))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::PoolTimedOut => Self::Timeout,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => Self::Conflict {
                constraint: db
                    .constraint()
                    .map(str::to_string)
                    .unwrap_or_else(|| db.message().to_string()),
            },
            other => Self::Database(other),
        }
    }
}

/// Columns whose uniqueness a caller may legitimately collide with.
const CONFLICT_FIELDS: &[&str] = &[
    "username",
    "email",
    "external_id",
    "leased_address",
    "credential",
    "name",
];

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Conflict { constraint } => {
                let field = CONFLICT_FIELDS
                    .iter()
                    .find(|f| constraint.contains(*f))
                    .copied()
                    .unwrap_or("unique field");
                EngineError::Conflict(format!("{field} already in use"))
            }
            LedgerError::NotFound => EngineError::NotFound("record"),
            LedgerError::Timeout => {
                tracing::warn!("ledger pool acquire timed out");
                EngineError::Unavailable
            }
            LedgerError::Database(e) => {
                tracing::error!(error = %e, "ledger failure");
                EngineError::Unavailable
            }
            LedgerError::Corrupt(e) => {
                tracing::error!(error = %e, "corrupt ledger row");
                EngineError::Unavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(matches!(
            LedgerError::from(sqlx::Error::RowNotFound),
            LedgerError::NotFound
        ));
        assert!(matches!(
            LedgerError::from(sqlx::Error::PoolTimedOut),
            LedgerError::Timeout
        ));
    }

    #[test]
    fn test_conflict_matching() {
        let err = LedgerError::Conflict {
            constraint: "UNIQUE constraint failed: users.email".into(),
        };
        assert!(err.is_conflict_on("email"));
        assert!(!err.is_conflict_on("username"));
        assert!(!LedgerError::NotFound.is_conflict_on("email"));
    }

    #[test]
    fn test_engine_mapping_hides_driver_text() {
        let err: EngineError = LedgerError::Database(sqlx::Error::PoolClosed).into();
        assert_eq!(err, EngineError::Unavailable);

        let err: EngineError = LedgerError::Conflict {
            constraint: "users_email_key".into(),
        }
        .into();
        assert_eq!(err, EngineError::Conflict("email already in use".into()));
    }
}
