//! The engine facade.

use std::sync::Arc;

use ipnet::Ipv4Net;
use tracing::{info, warn};
use vpn_config::Config;
use vpn_core::{BackendKind, ERROR_AUTH, ERROR_TIMEOUT, EngineError, Entitlement, SessionId, UserId};
use vpn_identity::{Argon2JwtCredentials, IdentityService, IdentitySettings, LoginGrant, Profile};
use vpn_ledger::{LedgerConfig, Payment, PaymentStatus, Session, SqlLedger, Tariff, User};
use vpn_provision::{
    AdapterPolicy, LeasePool, Provisioner, ProxyAdapter, ReconcileReport, ServerInfo,
    WireGuardAdapter,
};
use vpn_session::{Connection, SessionService, SessionSettings};

use crate::error::StartError;

/// Every operation the routing layer can call.
///
/// Errors are [`EngineError`]s whose `Display` text is safe to return to a
/// client.
pub struct Engine {
    config: Config,
    ledger: SqlLedger,
    identity: Arc<IdentityService>,
    provisioner: Arc<Provisioner>,
    sessions: SessionService,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("backends", &self.provisioner.backends())
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Connect to the ledger, migrate it and build the services.
    ///
    /// Daemons are not touched; see [`Engine::start`].
    pub async fn open(config: Config) -> Result<Self, StartError> {
        let db = &config.database;
        let ledger = SqlLedger::connect(
            LedgerConfig::new(db.url.clone())
                .max_connections(db.max_connections)
                .min_connections(db.min_connections)
                .acquire_timeout(db.acquire_timeout())
                .max_lifetime(non_zero_secs(db.max_lifetime_secs))
                .idle_timeout(non_zero_secs(db.idle_timeout_secs)),
        )
        .await?;
        Self::with_ledger(config, ledger).await
    }

    /// Build the services on an already connected ledger.
    pub async fn with_ledger(config: Config, ledger: SqlLedger) -> Result<Self, StartError> {
        let base = ledger
            .migrate(&config.engine.base_tariff, config.engine.base_tariff_limit_bytes)
            .await?;

        let credentials = Argon2JwtCredentials::new(config.auth.jwt_secret.as_bytes())?
            .token_ttl_secs(config.auth.token_ttl_secs)
            .issuer(config.auth.issuer.clone());
        let identity = Arc::new(IdentityService::new(
            ledger.clone(),
            Arc::new(credentials),
            IdentitySettings::new(base.id)
                .subscription_period_days(config.engine.subscription_period_days),
        ));

        let provisioner = Arc::new(build_provisioner(&config, &ledger)?);
        let sessions = SessionService::new(
            ledger.clone(),
            identity.clone(),
            provisioner.clone(),
            SessionSettings::default()
                .operation_timeout(config.engine.operation_timeout())
                .max_usage_delta_bytes(config.engine.max_usage_delta_bytes),
        );

        Ok(Self {
            config,
            ledger,
            identity,
            provisioner,
            sessions,
        })
    }

    /// [`open`](Self::open), then bring daemons up, restore the session
    /// registry and reconcile backends if configured.
    pub async fn start(config: Config) -> Result<Self, StartError> {
        let engine = Self::open(config).await?;

        let manage_wg = engine
            .config
            .wireguard
            .as_ref()
            .is_some_and(|wg| wg.manage_interface);
        let start_proxy = engine
            .config
            .proxy
            .as_ref()
            .is_some_and(|p| p.start_command.is_some());
        if manage_wg || start_proxy {
            engine.provisioner.start_all().await?;
        }

        engine.sessions.restore_active().await?;

        if engine.config.engine.reconcile_on_start {
            for report in engine.reconcile_all().await? {
                if report.failed > 0 {
                    warn!(backend = ?report.backend, failed = report.failed, "startup reconcile incomplete");
                }
            }
        }

        info!(
            backends = ?engine.provisioner.backends(),
            active_sessions = engine.sessions.active().len(),
            "engine started"
        );
        Ok(engine)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &SqlLedger {
        &self.ledger
    }

    pub fn identity(&self) -> &IdentityService {
        &self.identity
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    // ---------------------------------------------------------------------
    // Identity
    // ---------------------------------------------------------------------

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, EngineError> {
        self.deadline(
            "register",
            self.identity.register_with_password(username, email, password),
        )
        .await
    }

    /// Verify a login. Unknown identifiers and wrong passwords look the same.
    pub async fn authenticate(&self, identifier: &str, password: &str) -> Result<User, EngineError> {
        let verified = self
            .deadline("authenticate", self.identity.authenticate(identifier, password))
            .await;
        match verified {
            Err(EngineError::NotFound(_)) => {
                vpn_metrics::record_error(ERROR_AUTH);
                Err(EngineError::BadCredential)
            }
            other => other,
        }
    }

    pub async fn login(&self, identifier: &str, password: &str) -> Result<LoginGrant, EngineError> {
        self.deadline("login", self.identity.login(identifier, password))
            .await
    }

    pub async fn resolve_token(&self, token: &str) -> Result<UserId, EngineError> {
        self.deadline("resolve_token", self.identity.resolve_token(token))
            .await
    }

    pub async fn get_profile(&self, user_id: UserId) -> Result<Profile, EngineError> {
        self.deadline("get_profile", self.identity.get_profile(user_id))
            .await
    }

    pub async fn list_tariffs(&self) -> Result<Vec<Tariff>, EngineError> {
        self.deadline("list_tariffs", self.identity.list_tariffs())
            .await
    }

    pub async fn record_payment(
        &self,
        user_id: UserId,
        amount_cents: i64,
        status: PaymentStatus,
    ) -> Result<Payment, EngineError> {
        self.deadline(
            "record_payment",
            self.identity.record_payment(user_id, amount_cents, status),
        )
        .await
    }

    pub async fn link_external_identity(
        &self,
        user_id: UserId,
        external_id: &str,
    ) -> Result<User, EngineError> {
        self.deadline(
            "link_external_identity",
            self.identity.link_external_identity(user_id, external_id),
        )
        .await
    }

    pub async fn renew_subscription(
        &self,
        user_id: UserId,
        period_days: u32,
    ) -> Result<User, EngineError> {
        self.deadline(
            "renew_subscription",
            self.identity.renew_subscription(user_id, period_days),
        )
        .await
    }

    pub async fn check_entitlement(&self, user_id: UserId) -> Result<Entitlement, EngineError> {
        self.deadline("check_entitlement", self.identity.check_entitlement(user_id))
            .await
    }

    // ---------------------------------------------------------------------
    // Sessions
    // ---------------------------------------------------------------------

    pub async fn connect(&self, user_id: UserId) -> Result<Connection, EngineError> {
        self.sessions.connect(user_id).await
    }

    pub async fn disconnect(
        &self,
        session_id: SessionId,
        final_usage: i64,
    ) -> Result<Session, EngineError> {
        self.sessions.disconnect(session_id, final_usage).await
    }

    pub async fn record_usage(
        &self,
        session_id: SessionId,
        delta: i64,
    ) -> Result<Entitlement, EngineError> {
        self.sessions.record_usage(session_id, delta).await
    }

    // ---------------------------------------------------------------------
    // Provisioning
    // ---------------------------------------------------------------------

    /// Revoke all of a user's endpoints. Returns how many were removed.
    pub async fn deprovision_user(&self, user_id: UserId) -> Result<usize, EngineError> {
        self.deadline("deprovision_user", self.provisioner.deprovision_all(user_id))
            .await
    }

    pub async fn reconcile(&self, backend: BackendKind) -> Result<ReconcileReport, EngineError> {
        self.deadline("reconcile", self.provisioner.reconcile(backend))
            .await
    }

    /// Reconcile every configured backend, each under its own deadline.
    pub async fn reconcile_all(&self) -> Result<Vec<ReconcileReport>, EngineError> {
        let mut reports = Vec::new();
        for backend in self.provisioner.backends() {
            reports.push(self.reconcile(backend).await?);
        }
        Ok(reports)
    }

    /// Stop managed daemons and close the ledger pool.
    pub async fn shutdown(&self) {
        let manage_wg = self
            .config
            .wireguard
            .as_ref()
            .is_some_and(|wg| wg.manage_interface);
        if manage_wg
            && let Err(err) = self.provisioner.stop_all().await
        {
            warn!(error = %err, "stopping backends failed");
        }
        self.ledger.close().await;
        info!("engine stopped");
    }

    /// Bound an operation by the configured operation timeout.
    async fn deadline<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        let limit = self.config.engine.operation_timeout();
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout = ?limit, "operation deadline exceeded");
                vpn_metrics::record_error(ERROR_TIMEOUT);
                Err(EngineError::Timeout)
            }
        }
    }
}

fn non_zero_secs(secs: u64) -> Option<std::time::Duration> {
    (secs > 0).then(|| std::time::Duration::from_secs(secs))
}

/// Build the provisioner and its adapters from configuration.
pub(crate) fn build_provisioner(config: &Config, ledger: &SqlLedger) -> Result<Provisioner, StartError> {
    let policy = AdapterPolicy::new(
        config.engine.adapter_timeout(),
        config.engine.adapter_retry_delay(),
    );
    let mut provisioner = Provisioner::new(ledger.clone()).with_policy(policy);

    if let Some(wg) = &config.wireguard {
        let pool: Ipv4Net = wg
            .address_pool
            .parse()
            .map_err(|e| StartError::Backend(format!("wireguard address pool: {e}")))?;
        let adapter = WireGuardAdapter::new(wg.interface.clone())
            .wg_binary(wg.wg_binary.clone())
            .wg_quick_binary(wg.wg_quick_binary.clone());
        provisioner = provisioner
            .with_adapter(Arc::new(adapter))
            .with_lease_pool(LeasePool::new(pool));
        if let (Some(public_key), Some(endpoint)) = (&wg.server_public_key, &wg.endpoint) {
            provisioner = provisioner.with_server_info(ServerInfo {
                public_key: public_key.clone(),
                endpoint: endpoint.clone(),
                dns: wg.client_dns.clone(),
                keepalive_secs: wg.keepalive_secs,
            });
        }
    }

    if let Some(proxy) = &config.proxy {
        let mut adapter = ProxyAdapter::new(proxy.config_path.clone(), &proxy.reload_command)
            .email_domain(proxy.email_domain.clone());
        if let Some(cmd) = &proxy.start_command {
            adapter = adapter.start_command(cmd);
        }
        provisioner = provisioner.with_adapter(Arc::new(adapter));
    }

    Ok(provisioner)
}
