//! Provisioner tests with in-process adapters and in-memory SQLite.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use vpn_core::{BackendKind, EngineError, UserId};
use vpn_ledger::{LedgerConfig, NewUser, SqlLedger, Tariff, repo};

use crate::proxy::ProxyDocument;
use crate::{
    AdapterError, AdapterPolicy, BackendAdapter, LeasePool, PeerSpec, Provisioner, ProxyAdapter,
    ServerInfo,
};

/// Adapter keeping its live set in memory.
struct FakeAdapter {
    kind: BackendKind,
    live: Mutex<HashSet<String>>,
    applies: AtomicUsize,
    removes: AtomicUsize,
    /// Upcoming apply calls that fail.
    failing_applies: AtomicUsize,
    transient: bool,
}

impl FakeAdapter {
    fn new(kind: BackendKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            live: Mutex::new(HashSet::new()),
            applies: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
            failing_applies: AtomicUsize::new(0),
            transient: false,
        })
    }

    fn failing(kind: BackendKind, count: usize, transient: bool) -> Arc<Self> {
        Arc::new(Self {
            kind,
            live: Mutex::new(HashSet::new()),
            applies: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
            failing_applies: AtomicUsize::new(count),
            transient,
        })
    }

    fn applies(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }

    fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    fn live(&self) -> HashSet<String> {
        self.live.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendAdapter for FakeAdapter {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn apply(&self, peer: &PeerSpec) -> Result<(), AdapterError> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        let pending = self.failing_applies.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_applies.store(pending - 1, Ordering::SeqCst);
            return Err(if self.transient {
                AdapterError::Unavailable("daemon restarting".into())
            } else {
                AdapterError::Command {
                    program: "fake".into(),
                    code: Some(1),
                    stderr: "rejected".into(),
                }
            });
        }
        self.live.lock().unwrap().insert(peer.credential.clone());
        Ok(())
    }

    async fn remove(&self, credential: &str) -> Result<(), AdapterError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.live.lock().unwrap().remove(credential);
        Ok(())
    }

    async fn contains(&self, credential: &str) -> Result<bool, AdapterError> {
        Ok(self.live.lock().unwrap().contains(credential))
    }

    async fn list(&self) -> Result<Vec<String>, AdapterError> {
        Ok(self.live.lock().unwrap().iter().cloned().collect())
    }
}

/// Applies through the inner fake, then stalls before answering.
struct StallingAdapter {
    inner: Arc<FakeAdapter>,
    stall: Duration,
}

#[async_trait]
impl BackendAdapter for StallingAdapter {
    fn kind(&self) -> BackendKind {
        self.inner.kind
    }

    async fn apply(&self, peer: &PeerSpec) -> Result<(), AdapterError> {
        self.inner.apply(peer).await?;
        tokio::time::sleep(self.stall).await;
        Ok(())
    }

    async fn remove(&self, credential: &str) -> Result<(), AdapterError> {
        self.inner.remove(credential).await
    }

    async fn contains(&self, credential: &str) -> Result<bool, AdapterError> {
        self.inner.contains(credential).await
    }

    async fn list(&self) -> Result<Vec<String>, AdapterError> {
        self.inner.list().await
    }
}

fn fast_policy() -> AdapterPolicy {
    AdapterPolicy::new(Duration::from_secs(2), Duration::from_millis(1))
}

async fn setup() -> (SqlLedger, Tariff) {
    let ledger = SqlLedger::connect(LedgerConfig::in_memory())
        .await
        .expect("Failed to connect");
    let base = ledger.migrate("free", 0).await.expect("Failed to migrate");
    (ledger, base)
}

async fn add_user(ledger: &SqlLedger, base: &Tariff, name: &str) -> UserId {
    let email = format!("{name}@example.com");
    repo::users::insert(
        ledger.pool(),
        &NewUser {
            username: name,
            email: &email,
            password_hash: "hash",
            tariff_id: base.id,
        },
        1_000,
    )
    .await
    .expect("Failed to insert user")
    .id
}

fn wireguard(ledger: &SqlLedger, adapter: Arc<FakeAdapter>, cidr: &str) -> Provisioner {
    Provisioner::new(ledger.clone())
        .with_adapter(adapter)
        .with_lease_pool(LeasePool::new(cidr.parse().unwrap()))
        .with_policy(fast_policy())
}

#[tokio::test]
async fn test_first_connect_allocates_then_reuses() {
    let (ledger, base) = setup().await;
    let alice = add_user(&ledger, &base, "alice").await;
    let fake = FakeAdapter::new(BackendKind::WireGuard);
    let provisioner = wireguard(&ledger, fake.clone(), "10.8.0.0/24").with_server_info(ServerInfo {
        public_key: "SERVER=".into(),
        endpoint: "vpn.example.com:51820".into(),
        dns: "8.8.8.8".into(),
        keepalive_secs: 25,
    });

    let first = provisioner
        .ensure_provisioned(alice, BackendKind::WireGuard)
        .await
        .unwrap();
    assert!(first.created);
    assert_eq!(first.binding.leased_address.as_deref(), Some("10.8.0.2"));
    let config = first.client_config.as_deref().unwrap();
    assert!(config.contains("Address = 10.8.0.2/32"));
    assert!(config.contains(first.private_key.as_deref().unwrap()));
    assert!(!format!("{first:?}").contains(first.private_key.as_deref().unwrap()));

    let second = provisioner
        .ensure_provisioned(alice, BackendKind::WireGuard)
        .await
        .unwrap();
    assert!(!second.created);
    assert!(second.private_key.is_none());
    assert_eq!(second.binding.credential, first.binding.credential);
    assert_eq!(fake.applies(), 1);
}

#[tokio::test]
async fn test_lost_live_entry_is_reapplied_with_same_credential() {
    let (ledger, base) = setup().await;
    let alice = add_user(&ledger, &base, "alice").await;
    let fake = FakeAdapter::new(BackendKind::WireGuard);
    let provisioner = wireguard(&ledger, fake.clone(), "10.8.0.0/24");

    let first = provisioner
        .ensure_provisioned(alice, BackendKind::WireGuard)
        .await
        .unwrap();
    fake.live.lock().unwrap().clear();

    let again = provisioner
        .ensure_provisioned(alice, BackendKind::WireGuard)
        .await
        .unwrap();
    assert!(!again.created);
    assert_eq!(again.binding.credential, first.binding.credential);
    assert!(fake.live().contains(&first.binding.credential));
    assert_eq!(fake.applies(), 2);
}

#[tokio::test]
async fn test_adapter_failure_leaves_no_binding() {
    let (ledger, base) = setup().await;
    let alice = add_user(&ledger, &base, "alice").await;
    let fake = FakeAdapter::failing(BackendKind::WireGuard, 1, false);
    let provisioner = wireguard(&ledger, fake.clone(), "10.8.0.0/24");

    let err = provisioner
        .ensure_provisioned(alice, BackendKind::WireGuard)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ProvisionFailed(_)));
    assert!(!err.to_string().contains("rejected"));
    assert!(provisioner.bindings_for(alice).await.unwrap().is_empty());
    // Best-effort cleanup after the failed apply.
    assert_eq!(fake.removes(), 1);

    // The lease was not consumed.
    let ok = provisioner
        .ensure_provisioned(alice, BackendKind::WireGuard)
        .await
        .unwrap();
    assert_eq!(ok.binding.leased_address.as_deref(), Some("10.8.0.2"));
}

#[tokio::test]
async fn test_cancelled_provisioning_leaves_nothing_live() {
    let (ledger, base) = setup().await;
    let alice = add_user(&ledger, &base, "alice").await;
    let fake = FakeAdapter::new(BackendKind::Proxy);
    let provisioner = Provisioner::new(ledger.clone())
        .with_adapter(Arc::new(StallingAdapter {
            inner: fake.clone(),
            stall: Duration::from_millis(300),
        }))
        .with_policy(fast_policy());

    // The deadline fires after the daemon took the entry but before commit.
    let attempt = tokio::time::timeout(
        Duration::from_millis(100),
        provisioner.ensure_provisioned(alice, BackendKind::Proxy),
    )
    .await;
    assert!(attempt.is_err());

    // Cleanup runs on its own task.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(
        repo::bindings::list_for_user(ledger.pool(), alice)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(fake.live().is_empty());
    assert_eq!(fake.removes(), 1);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let (ledger, base) = setup().await;
    let alice = add_user(&ledger, &base, "alice").await;
    let fake = FakeAdapter::failing(BackendKind::Proxy, 1, true);
    let provisioner = Provisioner::new(ledger.clone())
        .with_adapter(fake.clone())
        .with_policy(fast_policy());

    let out = provisioner
        .ensure_provisioned(alice, BackendKind::Proxy)
        .await
        .unwrap();
    assert!(out.created);
    assert!(uuid::Uuid::parse_str(&out.binding.credential).is_ok());
    assert!(out.binding.leased_address.is_none());
    assert_eq!(fake.applies(), 2);
}

#[tokio::test]
async fn test_lowest_free_lease_is_reused_after_deprovision() {
    let (ledger, base) = setup().await;
    let fake = FakeAdapter::new(BackendKind::WireGuard);
    let provisioner = wireguard(&ledger, fake.clone(), "10.8.0.0/24");

    let a = add_user(&ledger, &base, "a").await;
    let b = add_user(&ledger, &base, "b").await;
    let c = add_user(&ledger, &base, "c").await;

    let lease = |p: crate::Provisioned| p.binding.leased_address.unwrap();
    assert_eq!(lease(provisioner.ensure_provisioned(a, BackendKind::WireGuard).await.unwrap()), "10.8.0.2");
    assert_eq!(lease(provisioner.ensure_provisioned(b, BackendKind::WireGuard).await.unwrap()), "10.8.0.3");

    assert!(provisioner.deprovision(a, BackendKind::WireGuard).await.unwrap());
    assert_eq!(lease(provisioner.ensure_provisioned(c, BackendKind::WireGuard).await.unwrap()), "10.8.0.2");
    assert_eq!(fake.live().len(), 2);
}

#[tokio::test]
async fn test_exhausted_pool_fails_cleanly() {
    let (ledger, base) = setup().await;
    let fake = FakeAdapter::new(BackendKind::WireGuard);
    let provisioner = wireguard(&ledger, fake.clone(), "10.9.0.0/30");

    let a = add_user(&ledger, &base, "a").await;
    let b = add_user(&ledger, &base, "b").await;
    provisioner.ensure_provisioned(a, BackendKind::WireGuard).await.unwrap();

    let err = provisioner
        .ensure_provisioned(b, BackendKind::WireGuard)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ProvisionFailed(_)));
    assert_eq!(fake.applies(), 1);
}

#[tokio::test]
async fn test_deprovision_without_binding_is_noop() {
    let (ledger, base) = setup().await;
    let alice = add_user(&ledger, &base, "alice").await;
    let fake = FakeAdapter::new(BackendKind::Proxy);
    let provisioner = Provisioner::new(ledger.clone()).with_adapter(fake.clone());

    assert!(!provisioner.deprovision(alice, BackendKind::Proxy).await.unwrap());
    assert_eq!(provisioner.deprovision_all(alice).await.unwrap(), 0);
    assert_eq!(fake.removes(), 0);
}

#[tokio::test]
async fn test_deprovision_all_covers_every_backend() {
    let (ledger, base) = setup().await;
    let alice = add_user(&ledger, &base, "alice").await;
    let wg = FakeAdapter::new(BackendKind::WireGuard);
    let proxy = FakeAdapter::new(BackendKind::Proxy);
    let provisioner = wireguard(&ledger, wg.clone(), "10.8.0.0/24").with_adapter(proxy.clone());
    assert_eq!(provisioner.backends(), BackendKind::ALL.to_vec());

    for backend in provisioner.backends() {
        provisioner.ensure_provisioned(alice, backend).await.unwrap();
    }
    assert_eq!(provisioner.bindings_for(alice).await.unwrap().len(), 2);

    assert_eq!(provisioner.deprovision_all(alice).await.unwrap(), 2);
    assert!(provisioner.bindings_for(alice).await.unwrap().is_empty());
    assert!(wg.live().is_empty());
    assert!(proxy.live().is_empty());
}

#[tokio::test]
async fn test_disabled_backend_is_invalid_input() {
    let (ledger, base) = setup().await;
    let alice = add_user(&ledger, &base, "alice").await;
    let provisioner = Provisioner::new(ledger.clone()).with_adapter(FakeAdapter::new(BackendKind::Proxy));

    let err = provisioner
        .ensure_provisioned(alice, BackendKind::WireGuard)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let (ledger, _) = setup().await;
    let provisioner = Provisioner::new(ledger.clone()).with_adapter(FakeAdapter::new(BackendKind::Proxy));
    let err = provisioner
        .ensure_provisioned(UserId(999), BackendKind::Proxy)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::NotFound("user"));
}

#[tokio::test]
async fn test_reconcile_restores_and_prunes() {
    let (ledger, base) = setup().await;
    let alice = add_user(&ledger, &base, "alice").await;
    let fake = FakeAdapter::new(BackendKind::Proxy);
    let provisioner = Provisioner::new(ledger.clone())
        .with_adapter(fake.clone())
        .with_policy(fast_policy());

    let bound = provisioner
        .ensure_provisioned(alice, BackendKind::Proxy)
        .await
        .unwrap();
    {
        let mut live = fake.live.lock().unwrap();
        live.clear();
        live.insert("stray".to_string());
    }

    let report = provisioner.reconcile(BackendKind::Proxy).await.unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(fake.live(), HashSet::from([bound.binding.credential.clone()]));

    let again = provisioner.reconcile(BackendKind::Proxy).await.unwrap();
    assert_eq!((again.applied, again.removed), (0, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_proxy_provisioning_keeps_every_client() {
    let (ledger, base) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let adapter = Arc::new(ProxyAdapter::new(&path, "true"));
    let provisioner = Arc::new(
        Provisioner::new(ledger.clone())
            .with_adapter(adapter)
            .with_policy(fast_policy()),
    );

    let alice = add_user(&ledger, &base, "alice").await;
    let bob = add_user(&ledger, &base, "bob").await;

    let mut handles = Vec::new();
    for user in [alice, bob, alice, bob, alice] {
        let provisioner = provisioner.clone();
        handles.push(tokio::spawn(async move {
            provisioner.ensure_provisioned(user, BackendKind::Proxy).await
        }));
    }
    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().created {
            created += 1;
        }
    }
    assert_eq!(created, 2);

    let doc = ProxyDocument::read(&path).await.unwrap();
    assert_eq!(doc.clients.len(), 2);
    let emails: HashSet<_> = doc.clients.iter().map(|c| c.email.as_str()).collect();
    assert!(emails.contains("alice@vpn.local"));
    assert!(emails.contains("bob@vpn.local"));
}
