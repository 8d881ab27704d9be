//! Credential service: password hashing and bearer tokens.

use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use vpn_core::{UserId, defaults, now_unix};

use crate::error::CredentialError;

/// Hashing and token contract used by the identity service.
///
/// Implementations must be thread-safe; hashing is called from blocking
/// worker threads.
pub trait CredentialService: Send + Sync {
    /// Produce an opaque, self-describing hash of `password`.
    fn hash(&self, password: &str) -> Result<String, CredentialError>;

    /// Check `password` against a stored hash. Malformed hashes never verify.
    fn verify(&self, hash: &str, password: &str) -> bool;

    /// Burn the same work as a real verification, for unknown identifiers.
    fn dummy_verify(&self, password: &str);

    /// Issue a bearer token for `user_id`.
    fn issue_token(&self, user_id: UserId) -> Result<String, CredentialError>;

    /// Resolve a bearer token; `None` when invalid, tampered or expired.
    fn resolve_token(&self, token: &str) -> Option<UserId>;
}

impl<C: CredentialService + ?Sized> CredentialService for Arc<C> {
    #[inline]
    fn hash(&self, password: &str) -> Result<String, CredentialError> {
        (**self).hash(password)
    }

    #[inline]
    fn verify(&self, hash: &str, password: &str) -> bool {
        (**self).verify(hash, password)
    }

    #[inline]
    fn dummy_verify(&self, password: &str) {
        (**self).dummy_verify(password)
    }

    #[inline]
    fn issue_token(&self, user_id: UserId) -> Result<String, CredentialError> {
        (**self).issue_token(user_id)
    }

    #[inline]
    fn resolve_token(&self, token: &str) -> Option<UserId> {
        (**self).resolve_token(token)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: u64,
    exp: u64,
    iss: String,
}

/// Argon2id password hashes (PHC strings) and HS256 JWT bearer tokens.
pub struct Argon2JwtCredentials {
    argon2: Argon2<'static>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl_secs: u64,
    dummy_hash: String,
}

impl Argon2JwtCredentials {
    /// Create a service with default Argon2id parameters.
    pub fn new(secret: &[u8]) -> Result<Self, CredentialError> {
        Self::with_params(secret, Params::default())
    }

    /// Create a service with explicit Argon2 cost parameters.
    pub fn with_params(secret: &[u8], params: Params) -> Result<Self, CredentialError> {
        if secret.is_empty() {
            return Err(CredentialError::Params("token secret is empty".into()));
        }
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let salt = SaltString::generate(&mut OsRng);
        let dummy_hash = argon2
            .hash_password(b"dummy password for unknown users", &salt)
            .map_err(CredentialError::hash)?
            .to_string();

        let issuer = defaults::DEFAULT_TOKEN_ISSUER.to_string();
        Ok(Self {
            argon2,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Self::validation_for(&issuer),
            issuer,
            ttl_secs: defaults::DEFAULT_TOKEN_TTL_SECS,
            dummy_hash,
        })
    }

    /// Builder: set token lifetime.
    pub fn token_ttl_secs(mut self, ttl: u64) -> Self {
        self.ttl_secs = ttl;
        self
    }

    /// Builder: set the `iss` claim issued and required.
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self.validation = Self::validation_for(&self.issuer);
        self
    }

    fn validation_for(issuer: &str) -> Validation {
        let mut validation = Validation::default();
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation
    }
}

impl CredentialService for Argon2JwtCredentials {
    fn hash(&self, password: &str) -> Result<String, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        Ok(self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(CredentialError::hash)?
            .to_string())
    }

    fn verify(&self, hash: &str, password: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    fn dummy_verify(&self, password: &str) {
        let _ = self.verify(&self.dummy_hash, password);
    }

    #[allow(clippy::cast_sign_loss)]
    fn issue_token(&self, user_id: UserId) -> Result<String, CredentialError> {
        let now = now_unix().max(0) as u64;
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + self.ttl_secs,
            iss: self.issuer.clone(),
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(CredentialError::token)
    }

    fn resolve_token(&self, token: &str) -> Option<UserId> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).ok()?;
        data.claims.sub.parse::<i64>().ok().map(UserId)
    }
}

impl std::fmt::Debug for Argon2JwtCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Argon2JwtCredentials")
            .field("issuer", &self.issuer)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) fn test_credentials() -> Argon2JwtCredentials {
    // Minimum cost keeps the suite fast.
    let params = Params::new(8, 1, 1, None).unwrap();
    Argon2JwtCredentials::with_params(b"test-secret-test-secret-test-secret", params).unwrap()
}
