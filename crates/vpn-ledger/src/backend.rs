//! SQL ledger backend.

use futures_util::future::BoxFuture;
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::records::Tariff;
use crate::tx::LedgerTx;
use crate::{queries, repo, schema};

/// Database type enum for DDL selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    /// PostgreSQL database.
    PostgreSQL,
    /// SQLite database.
    SQLite,
}

impl DatabaseType {
    /// Detect database type from URL.
    ///
    /// MySQL is not supported: it has no partial unique indexes, which the
    /// one-open-session-per-user rule depends on.
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if url.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }
}

/// Pooled connection to the ledger database.
///
/// Cheap to clone; clones share the pool.
///
/// # Example
///
/// ```ignore
/// use vpn_ledger::{LedgerConfig, SqlLedger};
///
/// let ledger = SqlLedger::connect(LedgerConfig::new("postgres://vpn@localhost/vpn")).await?;
/// let base = ledger.migrate("free", 1 << 30).await?;
/// ```
#[derive(Debug, Clone)]
pub struct SqlLedger {
    pool: AnyPool,
    db_type: DatabaseType,
}

impl SqlLedger {
    /// Connect to the database.
    pub async fn connect(config: LedgerConfig) -> Result<Self, LedgerError> {
        // Install database drivers for the "any" pool
        sqlx::any::install_default_drivers();

        let db_type = DatabaseType::from_url(&config.database_url).ok_or_else(|| {
            LedgerError::Database(sqlx::Error::Configuration(
                "unsupported database URL scheme (expected postgres:// or sqlite:)".into(),
            ))
        })?;

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .max_lifetime(config.max_lifetime)
            .idle_timeout(config.idle_timeout)
            .connect(&config.database_url)
            .await?;

        debug!(?db_type, max_connections = config.max_connections, "ledger pool ready");
        Ok(Self { pool, db_type })
    }

    /// Get the database type.
    pub fn database_type(&self) -> DatabaseType {
        self.db_type
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Create tables and indexes if missing and seed the base tariff.
    ///
    /// Safe to run on every start. Returns the base tariff row.
    pub async fn migrate(
        &self,
        base_tariff: &str,
        base_traffic_limit: u64,
    ) -> Result<Tariff, LedgerError> {
        let mut tx = self.begin().await?;
        for stmt in schema::statements(self.db_type) {
            sqlx::query(&stmt).execute(tx.conn()).await?;
        }
        sqlx::query(queries::TARIFF_SEED)
            .bind(base_tariff)
            .bind(i64::try_from(base_traffic_limit).unwrap_or(i64::MAX))
            .execute(tx.conn())
            .await?;
        let tariff = repo::tariffs::by_name(tx.conn(), base_tariff)
            .await?
            .ok_or(LedgerError::NotFound)?;
        tx.commit().await?;

        info!(base_tariff = %tariff.name, tariff_id = %tariff.id, "ledger schema ready");
        Ok(tariff)
    }

    /// Open a transaction.
    pub async fn begin(&self) -> Result<LedgerTx, LedgerError> {
        Ok(LedgerTx::new(self.pool.begin().await?))
    }

    /// Run `f` inside a transaction, committing on `Ok` and rolling back on `Err`.
    ///
    /// ```ignore
    /// let payment = ledger
    ///     .with_transaction(move |tx| Box::pin(async move {
    ///         let p = repo::payments::insert(tx.conn(), user, 500, PaymentStatus::Settled, now).await?;
    ///         repo::users::renew(tx.conn(), user, period, now).await?;
    ///         Ok::<_, LedgerError>(p)
    ///     }))
    ///     .await?;
    /// ```
    pub async fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut LedgerTx) -> BoxFuture<'t, Result<T, E>> + Send,
        T: Send,
        E: From<LedgerError> + Send,
    {
        let mut tx = self.begin().await?;
        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(error = %rb, "ledger rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
