//! End-to-end engine tests: in-memory SQLite and a proxy document in a
//! temporary directory, reloaded with `true`.

use vpn_config::{Config, parse_config};
use vpn_core::{BackendKind, EngineError, Entitlement, UserId};
use vpn_ledger::{LedgerConfig, PaymentStatus, SqlLedger};
use vpn_provision::proxy::ProxyDocument;

use crate::Engine;

fn test_config(dir: &tempfile::TempDir) -> Config {
    let path = dir.path().join("clients.json");
    let raw = format!(
        r#"
[database]
url = "sqlite::memory:"

[engine]
base_tariff = "free"
base_tariff_limit_bytes = 1000000
max_usage_delta_bytes = 10000000

[proxy]
config_path = "{}"
reload_command = "true"

[auth]
jwt_secret = "0123456789abcdef0123456789abcdef"
"#,
        path.display()
    );
    parse_config(&raw, "toml").unwrap()
}

async fn engine(dir: &tempfile::TempDir) -> Engine {
    let ledger = SqlLedger::connect(LedgerConfig::in_memory()).await.unwrap();
    Engine::with_ledger(test_config(dir), ledger).await.unwrap()
}

async fn proxy_ids(engine: &Engine) -> Vec<String> {
    ProxyDocument::read(&engine.config().proxy.as_ref().unwrap().config_path)
        .await
        .unwrap()
        .ids()
}

#[tokio::test]
async fn test_register_login_and_resolve_token() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir).await;

    let user = engine
        .register("alice", "alice@example.com", "correct horse")
        .await
        .unwrap();
    let grant = engine.login("alice", "correct horse").await.unwrap();
    assert_eq!(grant.user.id, user.id);
    assert_eq!(engine.resolve_token(&grant.token).await.unwrap(), user.id);

    let by_email = engine
        .authenticate("alice@example.com", "correct horse")
        .await
        .unwrap();
    assert_eq!(by_email.id, user.id);
}

#[tokio::test]
async fn test_unknown_user_and_wrong_password_look_the_same() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir).await;
    engine
        .register("alice", "alice@example.com", "correct horse")
        .await
        .unwrap();

    assert_eq!(
        engine.authenticate("mallory", "guess").await.unwrap_err(),
        EngineError::BadCredential
    );
    assert_eq!(
        engine.authenticate("alice", "guess").await.unwrap_err(),
        EngineError::BadCredential
    );
}

#[tokio::test]
async fn test_paid_user_connects_and_disconnects() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir).await;
    let user = engine
        .register("alice", "alice@example.com", "correct horse")
        .await
        .unwrap();

    assert_eq!(
        engine.check_entitlement(user.id).await.unwrap(),
        Entitlement::Expired
    );
    engine
        .record_payment(user.id, 499, PaymentStatus::Settled)
        .await
        .unwrap();
    assert_eq!(
        engine.check_entitlement(user.id).await.unwrap(),
        Entitlement::Active
    );

    let conn = engine.connect(user.id).await.unwrap();
    assert_eq!(conn.endpoints.len(), 1);
    let endpoint = &conn.endpoints[0];
    assert_eq!(endpoint.binding.backend, BackendKind::Proxy);
    assert_eq!(proxy_ids(&engine).await, vec![endpoint.binding.credential.clone()]);

    let closed = engine.disconnect(conn.session.id, 250_000).await.unwrap();
    assert_eq!(closed.data_usage, 250_000);
    let profile = engine.get_profile(user.id).await.unwrap();
    assert_eq!(profile.user.used_traffic, 250_000);
    assert_eq!(profile.entitlement, Entitlement::Active);
}

#[tokio::test]
async fn test_deprovision_and_reconcile() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir).await;
    let user = engine
        .register("alice", "alice@example.com", "correct horse")
        .await
        .unwrap();
    engine
        .record_payment(user.id, 499, PaymentStatus::Settled)
        .await
        .unwrap();
    let conn = engine.connect(user.id).await.unwrap();
    engine.disconnect(conn.session.id, 0).await.unwrap();

    // The daemon lost its state: reconcile puts the client back.
    let path = engine.config().proxy.as_ref().unwrap().config_path.clone();
    tokio::fs::remove_file(&path).await.unwrap();
    let report = engine.reconcile(BackendKind::Proxy).await.unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(proxy_ids(&engine).await.len(), 1);

    assert_eq!(engine.deprovision_user(user.id).await.unwrap(), 1);
    assert!(proxy_ids(&engine).await.is_empty());
    assert!(
        engine
            .provisioner()
            .bindings_for(user.id)
            .await
            .unwrap()
            .is_empty()
    );

    let reports = engine.reconcile_all().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].applied + reports[0].removed, 0);
}

#[tokio::test]
async fn test_disabled_backend_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir).await;
    assert!(matches!(
        engine.reconcile(BackendKind::WireGuard).await,
        Err(EngineError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_stalled_ledger_hits_operation_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.engine.operation_timeout_secs = 1;
    let ledger = SqlLedger::connect(LedgerConfig::in_memory()).await.unwrap();
    let engine = Engine::with_ledger(config, ledger).await.unwrap();
    let user = UserId(42);

    // Hold the single pooled connection so every ledger call waits.
    let held = engine.ledger().begin().await.unwrap();

    assert_eq!(
        engine.check_entitlement(user).await.unwrap_err(),
        EngineError::Timeout
    );
    assert_eq!(
        engine.renew_subscription(user, 30).await.unwrap_err(),
        EngineError::Timeout
    );
    assert_eq!(
        engine.deprovision_user(user).await.unwrap_err(),
        EngineError::Timeout
    );

    drop(held);
    assert!(matches!(
        engine.check_entitlement(user).await,
        Err(EngineError::NotFound(_))
    ));
}
