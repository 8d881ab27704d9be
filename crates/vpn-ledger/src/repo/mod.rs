//! Typed statements, one module per table.
//!
//! Every function takes any executor: pass `ledger.pool()` for a standalone
//! statement or `tx.conn()` to run inside a [`LedgerTx`](crate::LedgerTx).

pub mod bindings;
pub mod payments;
pub mod sessions;
pub mod tariffs;
pub mod users;

/// Convert a byte counter to its signed column value, saturating.
#[inline]
pub(crate) fn db_counter(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}
