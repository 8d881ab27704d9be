//! WireGuard key management.
//!
//! X25519 keys, base64-encoded as the `wg` tool expects.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

/// A freshly generated peer key pair.
///
/// The private half leaves the engine exactly once, in the connect result.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Restore a key pair from a base64 private key.
    pub fn from_private_base64(s: &str) -> Option<Self> {
        let bytes: [u8; 32] = BASE64.decode(s.trim()).ok()?.try_into().ok()?;
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Some(Self { secret, public })
    }

    pub fn private_base64(&self) -> String {
        BASE64.encode(self.secret.to_bytes())
    }

    pub fn public_base64(&self) -> String {
        BASE64.encode(self.public.as_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_base64())
            .field("secret", &"[redacted]")
            .finish()
    }
}

/// Whether `s` is a base64-encoded 32-byte key.
pub fn is_valid_key(s: &str) -> bool {
    BASE64.decode(s).map(|b| b.len() == 32).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_are_distinct_and_valid() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(a.public_base64(), b.public_base64());
        assert!(is_valid_key(&a.public_base64()));
        assert!(is_valid_key(&a.private_base64()));
        assert_eq!(a.public_base64().len(), 44);
    }

    #[test]
    fn test_public_key_derives_from_private() {
        let pair = KeyPair::generate();
        let restored = KeyPair::from_private_base64(&pair.private_base64()).unwrap();
        assert_eq!(restored.public_base64(), pair.public_base64());
        assert!(KeyPair::from_private_base64("short").is_none());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let pair = KeyPair::generate();
        let shown = format!("{pair:?}");
        assert!(!shown.contains(&pair.private_base64()));
        assert!(shown.contains("redacted"));
    }
}
