//! Endpoint provisioner.
//!
//! Keeps every backend's live configuration in step with the ledger's
//! bindings. A binding is only committed after its adapter accepted it, so
//! a failed or cancelled call leaves neither a ledger row nor a live entry.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use vpn_core::defaults::LEASE_ALLOCATION_ATTEMPTS;
use vpn_core::{BackendKind, EngineError, KeyedMutex, UserId, now_unix};
use vpn_ledger::{Binding, LedgerTx, SqlLedger, repo};

use crate::adapter::{AdapterPolicy, BackendAdapter, PeerSpec};
use crate::wireguard::{KeyPair, LeasePool, ServerInfo, render_wireguard_client_config};

/// A live binding, as returned to the connecting client.
#[derive(Clone, Serialize)]
pub struct Provisioned {
    pub binding: Binding,
    /// WireGuard private key; only present when the binding was just created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Rendered client file; only present together with `private_key`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_config: Option<String>,
    /// Whether this call created the binding.
    pub created: bool,
}

impl fmt::Debug for Provisioned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provisioned")
            .field("binding", &self.binding)
            .field("private_key", &self.private_key.as_ref().map(|_| "[redacted]"))
            .field("created", &self.created)
            .finish()
    }
}

impl Provisioned {
    fn existing(binding: Binding) -> Self {
        Self {
            binding,
            private_key: None,
            client_config: None,
            created: false,
        }
    }
}

/// Outcome of [`Provisioner::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub backend: Option<BackendKind>,
    /// Ledger bindings re-applied to the daemon.
    pub applied: usize,
    /// Live entries without a binding that were removed.
    pub removed: usize,
    pub failed: usize,
}

/// Allocates credentials and drives backend adapters.
pub struct Provisioner {
    ledger: SqlLedger,
    adapters: HashMap<BackendKind, Arc<dyn BackendAdapter>>,
    leases: Option<LeasePool>,
    server: Option<ServerInfo>,
    policy: AdapterPolicy,
    locks: KeyedMutex<(UserId, BackendKind)>,
}

impl fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provisioner")
            .field("backends", &self.backends())
            .field("leases", &self.leases)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Provisioner {
    pub fn new(ledger: SqlLedger) -> Self {
        Self {
            ledger,
            adapters: HashMap::new(),
            leases: None,
            server: None,
            policy: AdapterPolicy::default(),
            locks: KeyedMutex::new(),
        }
    }

    /// Enable a backend. A later adapter of the same kind replaces it.
    pub fn with_adapter(mut self, adapter: Arc<dyn BackendAdapter>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    /// Address pool for WireGuard peers.
    pub fn with_lease_pool(mut self, pool: LeasePool) -> Self {
        self.leases = Some(pool);
        self
    }

    /// Server details for rendering WireGuard client files.
    pub fn with_server_info(mut self, server: ServerInfo) -> Self {
        self.server = Some(server);
        self
    }

    pub fn with_policy(mut self, policy: AdapterPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enabled backends in provisioning order.
    pub fn backends(&self) -> Vec<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .filter(|kind| self.adapters.contains_key(kind))
            .collect()
    }

    pub fn adapter(&self, backend: BackendKind) -> Result<&Arc<dyn BackendAdapter>, EngineError> {
        self.adapters
            .get(&backend)
            .ok_or_else(|| EngineError::InvalidInput(format!("backend {backend} is not enabled")))
    }

    pub async fn bindings_for(&self, user_id: UserId) -> Result<Vec<Binding>, EngineError> {
        Ok(repo::bindings::list_for_user(self.ledger.pool(), user_id).await?)
    }

    /// Make sure `user_id` has a live binding on `backend`.
    pub async fn ensure_provisioned(
        &self,
        user_id: UserId,
        backend: BackendKind,
    ) -> Result<Provisioned, EngineError> {
        let shared = self.adapter(backend)?;
        let adapter: &dyn BackendAdapter = shared.as_ref();
        let _guard = self.locks.lock((user_id, backend)).await;

        let user = repo::users::by_id(self.ledger.pool(), user_id)
            .await?
            .ok_or(EngineError::NotFound("user"))?;

        if let Some(binding) = repo::bindings::get(self.ledger.pool(), user_id, backend).await? {
            return self.revive(adapter, binding, &user.username).await;
        }

        for attempt in 1..=LEASE_ALLOCATION_ATTEMPTS {
            if let Some(provisioned) = self.allocate(shared, user_id, &user.username).await? {
                return Ok(provisioned);
            }
            debug!(user_id = %user_id, attempt, "lease taken concurrently, retrying allocation");
        }
        warn!(user_id = %user_id, backend = %backend, "lease allocation kept conflicting");
        Err(EngineError::ProvisionFailed("no free address could be leased".into()))
    }

    /// Re-apply an existing binding if the daemon lost it.
    async fn revive(
        &self,
        adapter: &dyn BackendAdapter,
        binding: Binding,
        label: &str,
    ) -> Result<Provisioned, EngineError> {
        let backend = binding.backend;
        let credential = binding.credential.as_str();
        match self
            .policy
            .run(backend, "contains", move || adapter.contains(credential))
            .await
        {
            Ok(true) => return Ok(Provisioned::existing(binding)),
            Ok(false) => {}
            Err(err) => {
                debug!(backend = %backend, error = %err, "liveness check failed, re-applying");
            }
        }

        let spec = peer_spec(&binding, label);
        let spec = &spec;
        self.policy
            .run(backend, "apply", move || adapter.apply(spec))
            .await
            .map_err(|err| {
                warn!(user_id = %binding.user_id, backend = %backend, error = %err, "re-applying binding failed");
                EngineError::ProvisionFailed(format!("{backend} endpoint could not be activated"))
            })?;
        info!(user_id = %binding.user_id, backend = %backend, "binding re-applied");
        Ok(Provisioned::existing(binding))
    }

    /// One allocation attempt. `None` means the chosen lease was taken.
    async fn allocate(
        &self,
        shared: &Arc<dyn BackendAdapter>,
        user_id: UserId,
        label: &str,
    ) -> Result<Option<Provisioned>, EngineError> {
        let adapter: &dyn BackendAdapter = shared.as_ref();
        let backend = adapter.kind();
        let mut tx = self.ledger.begin().await?;

        let address = match backend {
            BackendKind::WireGuard => {
                let pool = self.leases.ok_or_else(|| {
                    EngineError::InvalidInput("wireguard address pool is not configured".into())
                })?;
                let used: HashSet<Ipv4Addr> = repo::bindings::leased_addresses(tx.conn(), backend)
                    .await?
                    .iter()
                    .filter_map(|addr| addr.parse().ok())
                    .collect();
                let ip = pool.allocate(&used).ok_or_else(|| {
                    warn!(backend = %backend, "address pool exhausted");
                    EngineError::ProvisionFailed("address pool exhausted".into())
                })?;
                Some(ip.to_string())
            }
            BackendKind::Proxy => None,
        };

        let (credential, private_key) = match backend {
            BackendKind::WireGuard => {
                let pair = KeyPair::generate();
                (pair.public_base64(), Some(pair.private_base64()))
            }
            BackendKind::Proxy => (uuid::Uuid::new_v4().to_string(), None),
        };

        let inserted = repo::bindings::insert(
            tx.conn(),
            user_id,
            backend,
            &credential,
            address.as_deref(),
            now_unix(),
        )
        .await;
        let binding = match inserted {
            Ok(binding) => binding,
            Err(err) if err.is_conflict_on("leased_address") => {
                rollback(tx).await;
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let spec = peer_spec(&binding, label);
        let spec_ref = &spec;
        // From here until the commit settles, dropping this future must not
        // leave a live entry without a binding.
        let mut pending = PendingApply::new(shared.clone(), self.policy, &spec.credential);
        if let Err(err) = self
            .policy
            .run(backend, "apply", move || adapter.apply(spec_ref))
            .await
        {
            warn!(user_id = %user_id, backend = %backend, error = %err, "provisioning failed");
            pending.disarm();
            self.undo_apply(adapter, &spec.credential).await;
            rollback(tx).await;
            return Err(EngineError::ProvisionFailed(format!(
                "{backend} endpoint could not be activated"
            )));
        }

        if let Err(err) = tx.commit().await {
            pending.disarm();
            self.undo_apply(adapter, &spec.credential).await;
            return Err(err.into());
        }
        pending.disarm();

        vpn_metrics::record_binding_provisioned(backend.as_str());
        info!(user_id = %user_id, backend = %backend, address = ?binding.leased_address, "binding provisioned");

        let client_config = match (&private_key, &binding.leased_address, &self.server) {
            (Some(key), Some(addr), Some(server)) => {
                Some(render_wireguard_client_config(key, addr, server))
            }
            _ => None,
        };
        Ok(Some(Provisioned {
            binding,
            private_key,
            client_config,
            created: true,
        }))
    }

    /// Best-effort removal of a possibly half-applied entry.
    async fn undo_apply(&self, adapter: &dyn BackendAdapter, credential: &str) {
        let backend = adapter.kind();
        if let Err(err) = self
            .policy
            .run(backend, "remove", move || adapter.remove(credential))
            .await
        {
            warn!(backend = %backend, error = %err, "cleanup after failed provisioning did not complete");
        }
    }

    /// Revoke `user_id`'s binding on `backend`. Returns whether one existed.
    pub async fn deprovision(&self, user_id: UserId, backend: BackendKind) -> Result<bool, EngineError> {
        let adapter: &dyn BackendAdapter = self.adapter(backend)?.as_ref();
        let _guard = self.locks.lock((user_id, backend)).await;

        let mut tx = self.ledger.begin().await?;
        let deleted = repo::bindings::delete(tx.conn(), user_id, backend).await?;
        let Some(binding) = deleted else {
            rollback(tx).await;
            return Ok(false);
        };

        let credential = binding.credential.as_str();
        if let Err(err) = self
            .policy
            .run(backend, "remove", move || adapter.remove(credential))
            .await
        {
            warn!(user_id = %user_id, backend = %backend, error = %err, "deprovisioning failed");
            rollback(tx).await;
            return Err(err.into());
        }
        tx.commit().await?;

        vpn_metrics::record_binding_revoked(backend.as_str());
        info!(user_id = %user_id, backend = %backend, "binding revoked");
        Ok(true)
    }

    /// Revoke every binding of `user_id`. Returns how many were removed.
    ///
    /// All backends are attempted; the first failure is returned afterwards.
    pub async fn deprovision_all(&self, user_id: UserId) -> Result<usize, EngineError> {
        let mut removed = 0;
        let mut first_err = None;
        for backend in self.backends() {
            match self.deprovision(user_id, backend).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(removed),
        }
    }

    /// Make `backend`'s live entries match the ledger.
    ///
    /// Meant for startup or maintenance: an entry applied by a provisioning
    /// call still in flight looks orphaned and would be removed.
    pub async fn reconcile(&self, backend: BackendKind) -> Result<ReconcileReport, EngineError> {
        let adapter: &dyn BackendAdapter = self.adapter(backend)?.as_ref();
        let mut report = ReconcileReport {
            backend: Some(backend),
            ..ReconcileReport::default()
        };

        let live: HashSet<String> = self
            .policy
            .run(backend, "list", move || adapter.list())
            .await?
            .into_iter()
            .collect();
        let bindings = repo::bindings::list_by_backend(self.ledger.pool(), backend).await?;
        let known: HashSet<&str> = bindings.iter().map(|b| b.credential.as_str()).collect();

        for binding in bindings.iter().filter(|b| !live.contains(&b.credential)) {
            let _guard = self.locks.lock((binding.user_id, backend)).await;
            let label = match repo::users::by_id(self.ledger.pool(), binding.user_id).await? {
                Some(user) => user.username,
                None => binding.user_id.to_string(),
            };
            let spec = peer_spec(binding, &label);
            let spec = &spec;
            match self.policy.run(backend, "apply", move || adapter.apply(spec)).await {
                Ok(()) => report.applied += 1,
                Err(err) => {
                    warn!(user_id = %binding.user_id, backend = %backend, error = %err, "reconcile apply failed");
                    report.failed += 1;
                }
            }
        }

        for credential in live.iter().filter(|c| !known.contains(c.as_str())) {
            let credential = credential.as_str();
            match self.policy.run(backend, "remove", move || adapter.remove(credential)).await {
                Ok(()) => report.removed += 1,
                Err(err) => {
                    warn!(backend = %backend, error = %err, "reconcile remove failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            backend = %backend,
            applied = report.applied,
            removed = report.removed,
            failed = report.failed,
            "backend reconciled"
        );
        Ok(report)
    }

    /// Start every enabled daemon.
    pub async fn start_all(&self) -> Result<(), EngineError> {
        for backend in self.backends() {
            let adapter: &dyn BackendAdapter = self.adapter(backend)?.as_ref();
            self.policy.run(backend, "start", move || adapter.start()).await?;
        }
        Ok(())
    }

    /// Stop every enabled daemon, attempting all of them.
    pub async fn stop_all(&self) -> Result<(), EngineError> {
        let mut first_err = None;
        for backend in self.backends() {
            let adapter: &dyn BackendAdapter = self.adapter(backend)?.as_ref();
            if let Err(err) = self.policy.run(backend, "stop", move || adapter.stop()).await {
                warn!(backend = %backend, error = %err, "stopping backend failed");
                first_err.get_or_insert(EngineError::from(err));
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

fn peer_spec(binding: &Binding, label: &str) -> PeerSpec {
    PeerSpec {
        credential: binding.credential.clone(),
        address: binding.leased_address.clone(),
        label: label.to_string(),
    }
}

/// Removes an applied entry whose binding was never committed.
///
/// Armed around `apply` and the commit; if the owning future is dropped in
/// between (deadline, caller gone) the removal runs on a spawned task.
struct PendingApply {
    adapter: Arc<dyn BackendAdapter>,
    policy: AdapterPolicy,
    credential: Option<String>,
}

impl PendingApply {
    fn new(adapter: Arc<dyn BackendAdapter>, policy: AdapterPolicy, credential: &str) -> Self {
        Self {
            adapter,
            policy,
            credential: Some(credential.to_string()),
        }
    }

    fn disarm(&mut self) {
        self.credential = None;
    }
}

impl Drop for PendingApply {
    fn drop(&mut self) {
        let Some(credential) = self.credential.take() else {
            return;
        };
        let adapter = self.adapter.clone();
        let policy = self.policy;
        let backend = adapter.kind();
        warn!(backend = %backend, "provisioning cancelled before commit, removing live entry");
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(backend = %backend, "no runtime for cleanup, reconcile will remove the entry");
            return;
        };
        handle.spawn(async move {
            let adapter: &dyn BackendAdapter = adapter.as_ref();
            let credential = credential.as_str();
            if let Err(err) = policy
                .run(backend, "remove", move || adapter.remove(credential))
                .await
            {
                warn!(backend = %backend, error = %err, "cleanup after cancelled provisioning did not complete");
            }
        });
    }
}

async fn rollback(tx: LedgerTx) {
    if let Err(err) = tx.rollback().await {
        warn!(error = %err, "ledger rollback failed");
    }
}
