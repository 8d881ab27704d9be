//! Typed proxy client document.
//!
//! Only the `clients` list is owned by the engine. Every other key, at the
//! top level and inside client entries, is carried through unchanged.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::AdapterError;

/// Current document schema version.
pub const DOCUMENT_VERSION: u32 = 1;

fn default_version() -> u32 {
    DOCUMENT_VERSION
}

/// One client entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyClient {
    /// Client UUID.
    pub id: String,
    #[serde(rename = "alterId", default)]
    pub alter_id: u32,
    #[serde(default)]
    pub email: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProxyClient {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alter_id: 0,
            email: email.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub clients: Vec<ProxyClient>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ProxyDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            clients: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl ProxyDocument {
    pub fn contains(&self, id: &str) -> bool {
        self.clients.iter().any(|c| c.id == id)
    }

    /// Add `client` unless its id is present. Returns whether the list changed.
    pub fn upsert(&mut self, client: ProxyClient) -> bool {
        if self.contains(&client.id) {
            return false;
        }
        self.clients.push(client);
        true
    }

    /// Remove every entry with `id`. Returns whether the list changed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.clients.len();
        self.clients.retain(|c| c.id != id);
        self.clients.len() != before
    }

    pub fn ids(&self) -> Vec<String> {
        self.clients.iter().map(|c| c.id.clone()).collect()
    }

    /// Read the document at `path`. A missing file is an empty document.
    pub async fn read(path: &Path) -> Result<Self, AdapterError> {
        match tokio::fs::read_to_string(path).await {
            Ok(data) => {
                let doc: Self = serde_json::from_str(&data).map_err(AdapterError::document)?;
                if doc.version > DOCUMENT_VERSION {
                    return Err(AdapterError::Document(format!(
                        "unsupported document version {}",
                        doc.version
                    )));
                }
                Ok(doc)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "proxy document missing, starting empty");
                Ok(Self::default())
            }
            Err(e) => Err(AdapterError::Io(e)),
        }
    }

    /// Replace the document at `path` atomically (tmp file + rename).
    pub async fn write(&self, path: &Path) -> Result<(), AdapterError> {
        let data = serde_json::to_string_pretty(self).map_err(AdapterError::document)?;
        let tmp = tmp_path(path);
        tokio::fs::write(&tmp, data.as_bytes()).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AdapterError::Io(e));
        }
        debug!(path = %path.display(), clients = self.clients.len(), "proxy document written");
        Ok(())
    }
}

/// Sibling temp path, so the rename stays on one filesystem.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "proxy.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_keys_survive_round_trip() {
        let raw = r#"{
            "inbounds": [{"port": 443, "protocol": "vless"}],
            "clients": [{"id": "a", "alterId": 0, "email": "a@x", "flow": "xtls-rprx-vision"}]
        }"#;
        let doc: ProxyDocument = serde_json::from_str(raw).unwrap();
        assert_eq!(doc.version, DOCUMENT_VERSION);
        assert_eq!(doc.clients[0].extra["flow"], "xtls-rprx-vision");

        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["inbounds"][0]["port"], 443);
        assert_eq!(back["clients"][0]["flow"], "xtls-rprx-vision");
        assert_eq!(back["version"], 1);
    }

    #[test]
    fn test_upsert_and_remove_by_id() {
        let mut doc = ProxyDocument::default();
        assert!(doc.upsert(ProxyClient::new("a", "alice@vpn.local")));
        assert!(!doc.upsert(ProxyClient::new("a", "other@vpn.local")));
        assert!(doc.upsert(ProxyClient::new("b", "bob@vpn.local")));
        assert_eq!(doc.ids(), vec!["a".to_string(), "b".to_string()]);
        assert!(doc.remove("a"));
        assert!(!doc.remove("a"));
        assert!(!doc.contains("a"));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert_eq!(ProxyDocument::read(&path).await.unwrap(), ProxyDocument::default());

        let mut doc = ProxyDocument::default();
        doc.upsert(ProxyClient::new("a", "alice@vpn.local"));
        doc.write(&path).await.unwrap();

        assert_eq!(ProxyDocument::read(&path).await.unwrap(), doc);
        assert!(!dir.path().join("config.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        assert!(matches!(
            ProxyDocument::read(&path).await,
            Err(AdapterError::Document(_))
        ));

        tokio::fs::write(&path, br#"{"version": 9, "clients": []}"#)
            .await
            .unwrap();
        assert!(ProxyDocument::read(&path).await.is_err());
    }
}
