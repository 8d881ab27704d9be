//! Ledger transactions.

use sqlx::{Any, AnyConnection, Transaction};

use crate::error::LedgerError;

/// An open ledger transaction.
///
/// Dropping it without [`commit`](Self::commit) rolls every write back, so a
/// cancelled or timed-out caller leaves no partial state.
pub struct LedgerTx {
    inner: Transaction<'static, Any>,
}

impl LedgerTx {
    pub(crate) fn new(inner: Transaction<'static, Any>) -> Self {
        Self { inner }
    }

    /// Connection to run statements on inside this transaction.
    #[inline]
    pub fn conn(&mut self) -> &mut AnyConnection {
        &mut self.inner
    }

    pub async fn commit(self) -> Result<(), LedgerError> {
        self.inner.commit().await.map_err(LedgerError::from)
    }

    pub async fn rollback(self) -> Result<(), LedgerError> {
        self.inner.rollback().await.map_err(LedgerError::from)
    }
}

impl std::fmt::Debug for LedgerTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerTx").finish_non_exhaustive()
    }
}
