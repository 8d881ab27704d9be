//! Connect, disconnect and usage accounting.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use vpn_core::{
    ERROR_TIMEOUT, EngineError, Entitlement, KeyedMutex, SessionId, UserId, defaults, now_unix,
};
use vpn_identity::IdentityService;
use vpn_ledger::repo::{sessions, users};
use vpn_ledger::{LedgerError, Session, SqlLedger};
use vpn_provision::{Provisioned, Provisioner};

use crate::registry::ActiveSessions;

/// Deadlines and accounting limits.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Bound on a whole connect, disconnect or usage report.
    pub operation_timeout: Duration,
    /// Largest usage delta accepted from one report.
    pub max_usage_delta_bytes: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(defaults::DEFAULT_OPERATION_TIMEOUT_SECS),
            max_usage_delta_bytes: defaults::DEFAULT_MAX_USAGE_DELTA_BYTES,
        }
    }
}

impl SessionSettings {
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn max_usage_delta_bytes(mut self, bytes: u64) -> Self {
        self.max_usage_delta_bytes = bytes;
        self
    }
}

/// Result of a successful connect.
#[derive(Debug, Clone, Serialize)]
pub struct Connection {
    pub session: Session,
    /// One live endpoint per enabled backend.
    pub endpoints: Vec<Provisioned>,
    /// The user was already connected and the open session was returned.
    pub resumed: bool,
}

pub struct SessionService {
    ledger: SqlLedger,
    identity: Arc<IdentityService>,
    provisioner: Arc<Provisioner>,
    settings: SessionSettings,
    locks: KeyedMutex<UserId>,
    active: ActiveSessions,
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("settings", &self.settings)
            .field("active", &self.active.len())
            .finish_non_exhaustive()
    }
}

fn rejection_reason(entitlement: Entitlement) -> &'static str {
    match entitlement {
        Entitlement::Active => "active",
        Entitlement::Expired => "expired",
        Entitlement::QuotaExceeded => "quota_exceeded",
    }
}

impl SessionService {
    pub fn new(
        ledger: SqlLedger,
        identity: Arc<IdentityService>,
        provisioner: Arc<Provisioner>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            ledger,
            identity,
            provisioner,
            settings,
            locks: KeyedMutex::new(),
            active: ActiveSessions::new(),
        }
    }

    pub fn active(&self) -> &ActiveSessions {
        &self.active
    }

    /// Load sessions left open by a previous run into the registry.
    pub async fn restore_active(&self) -> Result<usize, EngineError> {
        let open = sessions::list_open(self.ledger.pool()).await?;
        let count = open.len();
        self.active.reset(open.into_iter().map(|s| (s.user_id, s.id)));
        if count > 0 {
            info!(count, "restored open sessions");
        }
        Ok(count)
    }

    async fn deadline<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.settings.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout = ?self.settings.operation_timeout, "operation deadline exceeded");
                vpn_metrics::record_error(ERROR_TIMEOUT);
                Err(EngineError::Timeout)
            }
        }
    }

    fn validate_delta(&self, bytes: i64) -> Result<u64, EngineError> {
        let bytes = u64::try_from(bytes)
            .map_err(|_| EngineError::invalid("usage must not be negative"))?;
        if bytes > self.settings.max_usage_delta_bytes {
            return Err(EngineError::InvalidInput(format!(
                "usage report exceeds {} bytes",
                self.settings.max_usage_delta_bytes
            )));
        }
        Ok(bytes)
    }

    /// Open a session for `user_id`, provisioning every enabled backend.
    ///
    /// A user who is not entitled is rejected before anything is written or
    /// any daemon is touched.
    pub async fn connect(&self, user_id: UserId) -> Result<Connection, EngineError> {
        self.deadline("connect", self.connect_locked(user_id)).await
    }

    async fn connect_locked(&self, user_id: UserId) -> Result<Connection, EngineError> {
        let _guard = self.locks.lock(user_id).await;

        let entitlement = self.identity.check_entitlement(user_id).await?;
        if !entitlement.is_active() {
            vpn_metrics::record_connect_rejected(rejection_reason(entitlement));
            info!(user_id = %user_id, %entitlement, "connect rejected");
            return Err(EngineError::NotEntitled(entitlement));
        }

        let mut endpoints = Vec::new();
        for backend in self.provisioner.backends() {
            endpoints.push(self.provisioner.ensure_provisioned(user_id, backend).await?);
        }

        if let Some(open) = sessions::open_for_user(self.ledger.pool(), user_id).await? {
            debug!(user_id = %user_id, session_id = %open.id, "user already connected");
            self.active.insert(user_id, open.id);
            return Ok(Connection {
                session: open,
                endpoints,
                resumed: true,
            });
        }

        let (session, resumed) =
            match sessions::insert_open(self.ledger.pool(), user_id, now_unix()).await {
                Ok(session) => (session, false),
                // Another process opened one first; the partial index kept it unique.
                Err(err @ LedgerError::Conflict { .. }) => {
                    match sessions::open_for_user(self.ledger.pool(), user_id).await? {
                        Some(open) => (open, true),
                        None => return Err(err.into()),
                    }
                }
                Err(err) => return Err(err.into()),
            };

        self.active.insert(user_id, session.id);
        if !resumed {
            vpn_metrics::record_session_opened();
            info!(user_id = %user_id, session_id = %session.id, backends = endpoints.len(), "session opened");
        }
        Ok(Connection {
            session,
            endpoints,
            resumed,
        })
    }

    /// Close `session_id`, charging `final_usage` bytes to the session and user.
    ///
    /// A second call fails with `AlreadyClosed` and charges nothing.
    pub async fn disconnect(
        &self,
        session_id: SessionId,
        final_usage: i64,
    ) -> Result<Session, EngineError> {
        let usage = self.validate_delta(final_usage)?;
        self.deadline("disconnect", self.disconnect_locked(session_id, usage))
            .await
    }

    async fn disconnect_locked(&self, session_id: SessionId, usage: u64) -> Result<Session, EngineError> {
        let user_id = self.session_owner(session_id).await?;
        let _guard = self.locks.lock(user_id).await;
        let session = self.close(session_id, usage).await?;
        self.revoke_if_not_entitled(user_id).await;
        Ok(session)
    }

    /// Charge an interim usage report to an open session.
    ///
    /// When the report exhausts the user's entitlement the session is
    /// closed and endpoints are revoked; the new entitlement is returned.
    pub async fn record_usage(
        &self,
        session_id: SessionId,
        delta: i64,
    ) -> Result<Entitlement, EngineError> {
        let delta = self.validate_delta(delta)?;
        self.deadline("record_usage", self.record_usage_locked(session_id, delta))
            .await
    }

    async fn record_usage_locked(
        &self,
        session_id: SessionId,
        delta: u64,
    ) -> Result<Entitlement, EngineError> {
        let user_id = self.session_owner(session_id).await?;
        let _guard = self.locks.lock(user_id).await;

        self.ledger
            .with_transaction(move |tx| {
                Box::pin(async move {
                    if sessions::add_usage(tx.conn(), session_id, delta).await?.is_none() {
                        return Err(EngineError::AlreadyClosed);
                    }
                    users::add_traffic(tx.conn(), user_id, delta).await?;
                    Ok::<_, EngineError>(())
                })
            })
            .await?;
        vpn_metrics::record_accounted_bytes(delta);
        debug!(user_id = %user_id, session_id = %session_id, delta, "usage recorded");

        let entitlement = self.identity.check_entitlement(user_id).await?;
        if !entitlement.is_active() {
            info!(user_id = %user_id, session_id = %session_id, %entitlement, "entitlement exhausted, closing session");
            self.close(session_id, 0).await?;
            self.revoke(user_id).await;
        }
        Ok(entitlement)
    }

    async fn session_owner(&self, session_id: SessionId) -> Result<UserId, EngineError> {
        sessions::by_id(self.ledger.pool(), session_id)
            .await?
            .map(|s| s.user_id)
            .ok_or(EngineError::NotFound("session"))
    }

    /// Close the session and charge `usage` in one transaction.
    async fn close(&self, session_id: SessionId, usage: u64) -> Result<Session, EngineError> {
        let now = now_unix();
        let session = self
            .ledger
            .with_transaction(move |tx| {
                Box::pin(async move {
                    let closed = sessions::close(tx.conn(), session_id, usage, now)
                        .await?
                        .ok_or(EngineError::AlreadyClosed)?;
                    users::add_traffic(tx.conn(), closed.user_id, usage).await?;
                    Ok::<_, EngineError>(closed)
                })
            })
            .await?;

        self.active.remove(session.user_id, session.id);
        vpn_metrics::record_session_closed(session.duration_secs(now) as f64);
        vpn_metrics::record_accounted_bytes(usage);
        info!(
            user_id = %session.user_id,
            session_id = %session.id,
            data_usage = session.data_usage,
            "session closed"
        );
        Ok(session)
    }

    async fn revoke_if_not_entitled(&self, user_id: UserId) {
        match self.identity.check_entitlement(user_id).await {
            Ok(entitlement) if entitlement.is_active() => {}
            Ok(entitlement) => {
                info!(user_id = %user_id, %entitlement, "revoking endpoints");
                self.revoke(user_id).await;
            }
            Err(err) => warn!(user_id = %user_id, error = %err, "entitlement check after disconnect failed"),
        }
    }

    /// Best-effort removal of every endpoint; reconcile repairs leftovers.
    async fn revoke(&self, user_id: UserId) {
        if let Err(err) = self.provisioner.deprovision_all(user_id).await {
            warn!(user_id = %user_id, error = %err, "revoking endpoints failed");
        }
    }
}
