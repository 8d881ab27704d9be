//! WireGuard backend driven through the `wg` and `wg-quick` tools.

mod client_config;
mod keys;
mod lease;

pub use client_config::{ServerInfo, render_wireguard_client_config};
pub use keys::{KeyPair, is_valid_key};
pub use lease::LeasePool;

use std::io::ErrorKind;

use async_trait::async_trait;
use tracing::{debug, info};
use vpn_core::BackendKind;

use crate::adapter::{BackendAdapter, PeerSpec};
use crate::error::AdapterError;
use crate::process;

/// Peer table of one WireGuard interface.
///
/// Calls for the same peer are serialized by the provisioner; the kernel
/// applies `wg set` changes atomically per peer.
#[derive(Debug, Clone)]
pub struct WireGuardAdapter {
    interface: String,
    wg_binary: String,
    wg_quick_binary: String,
}

impl WireGuardAdapter {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            wg_binary: "wg".to_string(),
            wg_quick_binary: "wg-quick".to_string(),
        }
    }

    /// Use a different `wg` tool.
    pub fn wg_binary(mut self, program: impl Into<String>) -> Self {
        self.wg_binary = program.into();
        self
    }

    /// Use a different `wg-quick` tool.
    pub fn wg_quick_binary(mut self, program: impl Into<String>) -> Self {
        self.wg_quick_binary = program.into();
        self
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    async fn wg(&self, args: &[&str]) -> Result<String, AdapterError> {
        process::run(&self.wg_binary, args).await.map_err(classify)
    }
}

/// `wg` stderr printed while the interface is missing or being recreated.
const UNAVAILABLE_MARKERS: [&str; 3] = [
    "Unable to access interface",
    "No such device",
    "Resource temporarily unavailable",
];

/// Turn failures that clear up once the interface is back into
/// [`AdapterError::Unavailable`] so the call policy retries them.
fn classify(err: AdapterError) -> AdapterError {
    match err {
        AdapterError::Command { ref stderr, .. }
            if UNAVAILABLE_MARKERS.iter().any(|m| stderr.contains(m)) =>
        {
            AdapterError::Unavailable(stderr.clone())
        }
        AdapterError::Spawn { ref source, .. }
            if matches!(source.kind(), ErrorKind::WouldBlock | ErrorKind::ResourceBusy) =>
        {
            AdapterError::Unavailable(source.to_string())
        }
        other => other,
    }
}

/// Parse `wg show <iface> peers` output: one public key per line.
pub fn parse_peers(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl BackendAdapter for WireGuardAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::WireGuard
    }

    async fn apply(&self, peer: &PeerSpec) -> Result<(), AdapterError> {
        if !is_valid_key(&peer.credential) {
            return Err(AdapterError::InvalidCredential(
                "not a base64 x25519 public key".into(),
            ));
        }
        let address = peer
            .address
            .as_deref()
            .ok_or_else(|| AdapterError::InvalidCredential("peer has no leased address".into()))?;
        let allowed = format!("{address}/32");
        self.wg(&[
            "set",
            &self.interface,
            "peer",
            &peer.credential,
            "allowed-ips",
            &allowed,
        ])
        .await?;
        debug!(interface = %self.interface, label = %peer.label, %address, "wireguard peer set");
        Ok(())
    }

    async fn remove(&self, credential: &str) -> Result<(), AdapterError> {
        // Removing an unknown peer succeeds in `wg`.
        self.wg(&["set", &self.interface, "peer", credential, "remove"])
            .await?;
        debug!(interface = %self.interface, "wireguard peer removed");
        Ok(())
    }

    async fn contains(&self, credential: &str) -> Result<bool, AdapterError> {
        Ok(self.list().await?.iter().any(|key| key == credential))
    }

    async fn list(&self) -> Result<Vec<String>, AdapterError> {
        let out = self.wg(&["show", &self.interface, "peers"]).await?;
        Ok(parse_peers(&out))
    }

    async fn start(&self) -> Result<(), AdapterError> {
        process::run(&self.wg_quick_binary, ["up", self.interface.as_str()]).await?;
        info!(interface = %self.interface, "wireguard interface up");
        Ok(())
    }

    async fn stop(&self) -> Result<(), AdapterError> {
        process::run(&self.wg_quick_binary, ["down", self.interface.as_str()]).await?;
        info!(interface = %self.interface, "wireguard interface down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(key: &str) -> PeerSpec {
        PeerSpec {
            credential: key.to_string(),
            address: Some("10.8.0.2".into()),
            label: "alice".into(),
        }
    }

    #[test]
    fn test_parse_peer_list() {
        let out = "abc=\n\n  def=  \n";
        assert_eq!(parse_peers(out), vec!["abc=".to_string(), "def=".to_string()]);
        assert!(parse_peers("").is_empty());
    }

    #[tokio::test]
    async fn test_apply_runs_wg_set() {
        // `echo` accepts any arguments and exits 0.
        let adapter = WireGuardAdapter::new("wg-test").wg_binary("echo");
        let key = KeyPair::generate().public_base64();
        adapter.apply(&peer(&key)).await.unwrap();
        adapter.remove(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_parses_tool_output() {
        let adapter = WireGuardAdapter::new("wg-test").wg_binary("echo");
        // echo prints its arguments back: "show wg-test peers".
        let peers = adapter.list().await.unwrap();
        assert_eq!(peers, vec!["show wg-test peers".to_string()]);
        assert!(!adapter.contains("abc=").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_key_is_rejected_before_running_tool() {
        let adapter = WireGuardAdapter::new("wg-test").wg_binary("/nonexistent/wg");
        let err = adapter.apply(&peer("not-a-key")).await.unwrap_err();
        assert!(matches!(err, AdapterError::InvalidCredential(_)));
    }

    #[test]
    fn test_missing_interface_is_transient() {
        let err = classify(AdapterError::Command {
            program: "wg".into(),
            code: Some(1),
            stderr: "Unable to access interface: No such device".into(),
        });
        assert!(matches!(err, AdapterError::Unavailable(_)));
        assert!(err.is_transient());

        let busy = classify(AdapterError::Spawn {
            program: "wg".into(),
            source: std::io::Error::from(ErrorKind::WouldBlock),
        });
        assert!(busy.is_transient());

        let rejected = classify(AdapterError::Command {
            program: "wg".into(),
            code: Some(1),
            stderr: "Key is not the correct length or format".into(),
        });
        assert!(!rejected.is_transient());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_interface_flap_is_retried_once() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        use crate::adapter::AdapterPolicy;

        // Fails once as if the interface were being recreated, then succeeds.
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("failed-once");
        let script = dir.path().join("wg");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nif [ ! -f '{m}' ]; then\n  touch '{m}'\n  echo 'Unable to access interface: No such device' >&2\n  exit 1\nfi\nexit 0\n",
                m = marker.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let adapter = WireGuardAdapter::new("wg-test").wg_binary(script.display().to_string());
        let policy = AdapterPolicy::new(Duration::from_secs(5), Duration::from_millis(1));
        let key = KeyPair::generate().public_base64();
        let spec = peer(&key);
        let spec = &spec;
        let adapter = &adapter;
        policy
            .run(BackendKind::WireGuard, "apply", move || adapter.apply(spec))
            .await
            .unwrap();
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_tool_failure_is_permanent() {
        let adapter = WireGuardAdapter::new("wg-test")
            .wg_binary("false")
            .wg_quick_binary("false");
        let key = KeyPair::generate().public_base64();
        let err = adapter.apply(&peer(&key)).await.unwrap_err();
        assert!(matches!(err, AdapterError::Command { .. }));
        assert!(!err.is_transient());
        assert!(adapter.start().await.is_err());
    }
}
