//! V2Ray/VLESS backend: a client document plus a reload command.

mod document;

pub use document::{DOCUMENT_VERSION, ProxyClient, ProxyDocument};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vpn_core::BackendKind;

use crate::adapter::{BackendAdapter, PeerSpec};
use crate::error::AdapterError;
use crate::process;

#[derive(Debug, Default)]
struct ProxyState {
    /// The document changed but the daemon has not confirmed a reload.
    reload_pending: bool,
}

/// Proxy daemon whose clients live in one JSON document.
///
/// Read, modify, write and reload run under a single mutex, so concurrent
/// provisioning for different users never loses an entry.
#[derive(Debug)]
pub struct ProxyAdapter {
    path: PathBuf,
    reload_command: Option<(String, Vec<String>)>,
    start_command: Option<(String, Vec<String>)>,
    email_domain: String,
    state: Mutex<ProxyState>,
}

impl ProxyAdapter {
    pub fn new(path: impl Into<PathBuf>, reload_command: &str) -> Self {
        Self {
            path: path.into(),
            reload_command: process::split_command(reload_command),
            start_command: None,
            email_domain: vpn_core::defaults::DEFAULT_PROXY_EMAIL_DOMAIN.to_string(),
            state: Mutex::new(ProxyState::default()),
        }
    }

    pub fn start_command(mut self, command: &str) -> Self {
        self.start_command = process::split_command(command);
        self
    }

    pub fn email_domain(mut self, domain: impl Into<String>) -> Self {
        self.email_domain = domain.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn email_for(&self, label: &str) -> String {
        format!("{label}@{}", self.email_domain)
    }

    async fn reload(&self) -> Result<(), AdapterError> {
        let Some((program, args)) = &self.reload_command else {
            return Ok(());
        };
        match process::run(program, args).await {
            Ok(_) => Ok(()),
            // The document is already in place; a second signal may land.
            Err(AdapterError::Spawn { source, .. }) => Err(AdapterError::Reload(source.to_string())),
            Err(AdapterError::Command { code, .. }) => {
                Err(AdapterError::Reload(format!("reload exited with {code:?}")))
            }
            Err(other) => Err(other),
        }
    }

    /// Apply `edit` to the document, write it if it changed, then reload.
    async fn modify<F>(&self, edit: F) -> Result<(), AdapterError>
    where
        F: FnOnce(&mut ProxyDocument) -> bool,
    {
        let mut state = self.state.lock().await;
        let mut doc = ProxyDocument::read(&self.path).await?;
        if edit(&mut doc) {
            doc.write(&self.path).await?;
            state.reload_pending = true;
        }
        if state.reload_pending {
            if let Err(err) = self.reload().await {
                warn!(path = %self.path.display(), error = %err, "proxy reload failed");
                return Err(err);
            }
            state.reload_pending = false;
            debug!(path = %self.path.display(), "proxy daemon reloaded");
        }
        Ok(())
    }
}

#[async_trait]
impl BackendAdapter for ProxyAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Proxy
    }

    async fn apply(&self, peer: &PeerSpec) -> Result<(), AdapterError> {
        if uuid::Uuid::parse_str(&peer.credential).is_err() {
            return Err(AdapterError::InvalidCredential("client id is not a UUID".into()));
        }
        let client = ProxyClient::new(peer.credential.clone(), self.email_for(&peer.label));
        self.modify(move |doc| doc.upsert(client)).await
    }

    async fn remove(&self, credential: &str) -> Result<(), AdapterError> {
        self.modify(|doc| doc.remove(credential)).await
    }

    async fn contains(&self, credential: &str) -> Result<bool, AdapterError> {
        let _state = self.state.lock().await;
        Ok(ProxyDocument::read(&self.path).await?.contains(credential))
    }

    async fn list(&self) -> Result<Vec<String>, AdapterError> {
        let _state = self.state.lock().await;
        Ok(ProxyDocument::read(&self.path).await?.ids())
    }

    async fn start(&self) -> Result<(), AdapterError> {
        let Some((program, args)) = &self.start_command else {
            return Ok(());
        };
        process::run(program, args).await?;
        info!(path = %self.path.display(), "proxy daemon started");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: &str, label: &str) -> PeerSpec {
        PeerSpec {
            credential: id.to_string(),
            address: None,
            label: label.to_string(),
        }
    }

    fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    #[tokio::test]
    async fn test_apply_appends_and_preserves_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, br#"{"version": 1, "clients": [], "log": {"loglevel": "warning"}}"#)
            .await
            .unwrap();

        let adapter = ProxyAdapter::new(&path, "true").email_domain("example.net");
        let id = new_id();
        adapter.apply(&peer(&id, "alice")).await.unwrap();
        adapter.apply(&peer(&id, "alice")).await.unwrap();

        let doc = ProxyDocument::read(&path).await.unwrap();
        assert_eq!(doc.clients.len(), 1);
        assert_eq!(doc.clients[0].email, "alice@example.net");
        assert_eq!(doc.extra["log"]["loglevel"], "warning");
        assert!(adapter.contains(&id).await.unwrap());

        adapter.remove(&id).await.unwrap();
        adapter.remove(&id).await.unwrap();
        assert!(adapter.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_reload_is_transient_and_retried_on_next_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let failing = ProxyAdapter::new(&path, "false");
        let id = new_id();

        let err = failing.apply(&peer(&id, "bob")).await.unwrap_err();
        assert!(matches!(err, AdapterError::Reload(_)));
        assert!(err.is_transient());
        // The entry was written; the next call re-sends the reload.
        assert!(failing.contains(&id).await.unwrap());
        assert!(failing.state.lock().await.reload_pending);
    }

    #[tokio::test]
    async fn test_rejects_non_uuid_credential() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = ProxyAdapter::new(dir.path().join("config.json"), "true");
        let err = adapter.apply(&peer("not-a-uuid", "carol")).await.unwrap_err();
        assert!(matches!(err, AdapterError::InvalidCredential(_)));
    }

    #[tokio::test]
    async fn test_concurrent_applies_keep_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = std::sync::Arc::new(ProxyAdapter::new(dir.path().join("config.json"), "true"));

        let mut handles = Vec::new();
        for i in 0..16 {
            let adapter = adapter.clone();
            handles.push(tokio::spawn(async move {
                let id = new_id();
                adapter.apply(&peer(&id, &format!("user{i}"))).await.unwrap();
                id
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }

        let live = adapter.list().await.unwrap();
        assert_eq!(live.len(), 16);
        for id in ids {
            assert!(live.contains(&id));
        }
    }
}
