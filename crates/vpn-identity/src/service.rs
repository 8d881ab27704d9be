//! Identity and entitlement service.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info};
use vpn_core::{EngineError, Entitlement, TariffId, UserId, defaults, now_unix};
use vpn_ledger::repo::{payments, tariffs, users};
use vpn_ledger::{LedgerError, NewUser, Payment, PaymentStatus, SqlLedger, Tariff, User};

use crate::credentials::CredentialService;
use crate::validate;

/// Policy applied by the identity service.
#[derive(Debug, Clone)]
pub struct IdentitySettings {
    /// Tariff assigned to new users.
    pub base_tariff: TariffId,
    /// Days added per settled payment.
    pub subscription_period_days: u32,
}

impl IdentitySettings {
    pub fn new(base_tariff: TariffId) -> Self {
        Self {
            base_tariff,
            subscription_period_days: defaults::DEFAULT_SUBSCRIPTION_PERIOD_DAYS,
        }
    }

    /// Builder: set the renewal period.
    pub fn subscription_period_days(mut self, days: u32) -> Self {
        self.subscription_period_days = days;
        self
    }
}

/// A user with their tariff and current entitlement.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user: User,
    pub tariff: Tariff,
    pub entitlement: Entitlement,
}

/// Result of a successful login.
#[derive(Debug, Clone, Serialize)]
pub struct LoginGrant {
    pub user: User,
    pub token: String,
}

/// Registration, authentication, subscription and entitlement.
pub struct IdentityService {
    ledger: SqlLedger,
    credentials: Arc<dyn CredentialService>,
    settings: IdentitySettings,
}

fn or_not_found(what: &'static str) -> impl Fn(LedgerError) -> EngineError {
    move |err| match err {
        LedgerError::NotFound => EngineError::NotFound(what),
        other => other.into(),
    }
}

/// Run CPU-heavy credential work off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, EngineError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!(error = %e, "credential worker failed");
        EngineError::Unavailable
    })
}

impl IdentityService {
    pub fn new(
        ledger: SqlLedger,
        credentials: Arc<dyn CredentialService>,
        settings: IdentitySettings,
    ) -> Self {
        Self {
            ledger,
            credentials,
            settings,
        }
    }

    pub fn settings(&self) -> &IdentitySettings {
        &self.settings
    }

    /// Hash a password with the configured credential service.
    pub async fn hash_password(&self, password: &str) -> Result<String, EngineError> {
        validate::password(password)?;
        let creds = self.credentials.clone();
        let password = password.to_string();
        Ok(blocking(move || creds.hash(&password)).await??)
    }

    /// Create an account with an already-hashed password.
    ///
    /// The pre-check gives a precise error in the common case; the unique
    /// constraints still decide concurrent registrations.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, EngineError> {
        validate::username(username)?;
        validate::email(email)?;
        if password_hash.is_empty() {
            return Err(EngineError::invalid("password hash is empty"));
        }

        let pool = self.ledger.pool();
        if users::by_username(pool, username).await?.is_some() {
            return Err(EngineError::Conflict("username already in use".into()));
        }
        if users::by_email(pool, email).await?.is_some() {
            return Err(EngineError::Conflict("email already in use".into()));
        }

        let new = NewUser {
            username,
            email,
            password_hash,
            tariff_id: self.settings.base_tariff,
        };
        let user = users::insert(pool, &new, now_unix()).await.map_err(|e| {
            if matches!(e, LedgerError::Conflict { .. }) {
                debug!(username, "registration lost a uniqueness race");
            }
            EngineError::from(e)
        })?;

        vpn_metrics::record_registration();
        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(user)
    }

    /// Hash `password` and register.
    pub async fn register_with_password(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, EngineError> {
        validate::username(username)?;
        validate::email(email)?;
        let hash = self.hash_password(password).await?;
        self.register(username, email, &hash).await
    }

    /// Verify a username-or-email and password.
    ///
    /// Returns `NotFound` for an unknown identifier and `BadCredential` for
    /// a wrong password; the engine collapses both before answering callers.
    pub async fn authenticate(&self, identifier: &str, password: &str) -> Result<User, EngineError> {
        let found = users::by_login(self.ledger.pool(), identifier).await?;
        let creds = self.credentials.clone();
        let password = password.to_string();

        let Some(user) = found else {
            blocking(move || creds.dummy_verify(&password)).await?;
            vpn_metrics::record_auth_failure();
            debug!("authentication failed: unknown identifier");
            return Err(EngineError::NotFound("user"));
        };

        let hash = user.password_hash.clone();
        if blocking(move || creds.verify(&hash, &password)).await? {
            vpn_metrics::record_auth_success();
            debug!(user_id = %user.id, "authenticated");
            Ok(user)
        } else {
            vpn_metrics::record_auth_failure();
            debug!(user_id = %user.id, "authentication failed: wrong password");
            Err(EngineError::BadCredential)
        }
    }

    /// Authenticate and issue a bearer token.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<LoginGrant, EngineError> {
        let user = self
            .authenticate(identifier, password)
            .await
            .map_err(|e| match e {
                EngineError::NotFound(_) => EngineError::BadCredential,
                other => other,
            })?;
        let token = self.issue_token(user.id)?;
        Ok(LoginGrant { user, token })
    }

    pub fn issue_token(&self, user_id: UserId) -> Result<String, EngineError> {
        Ok(self.credentials.issue_token(user_id)?)
    }

    /// Resolve a bearer token to an existing user.
    pub async fn resolve_token(&self, token: &str) -> Result<UserId, EngineError> {
        let user_id = self
            .credentials
            .resolve_token(token)
            .ok_or(EngineError::BadCredential)?;
        match users::by_id(self.ledger.pool(), user_id).await? {
            Some(user) => Ok(user.id),
            None => Err(EngineError::BadCredential),
        }
    }

    pub async fn user(&self, user_id: UserId) -> Result<User, EngineError> {
        users::by_id(self.ledger.pool(), user_id)
            .await?
            .ok_or(EngineError::NotFound("user"))
    }

    pub async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>, EngineError> {
        Ok(users::list(self.ledger.pool(), limit, offset).await?)
    }

    /// Attach an external chat identity to a user.
    ///
    /// Re-linking the same pair succeeds without a write.
    pub async fn link_external_identity(
        &self,
        user_id: UserId,
        external_id: &str,
    ) -> Result<User, EngineError> {
        validate::external_id(external_id)?;
        let pool = self.ledger.pool();
        let user = self.user(user_id).await?;

        match user.external_id.as_deref() {
            Some(current) if current == external_id => return Ok(user),
            Some(_) => return Err(EngineError::AlreadyLinked),
            None => {}
        }
        if let Some(owner) = users::by_external_id(pool, external_id).await?
            && owner.id != user_id
        {
            return Err(EngineError::AlreadyLinked);
        }

        let user = users::link_external_id(pool, user_id, external_id)
            .await
            .map_err(|e| match e {
                LedgerError::Conflict { .. } => EngineError::AlreadyLinked,
                other => or_not_found("user")(other),
            })?;
        info!(user_id = %user.id, "external identity linked");
        Ok(user)
    }

    /// Extend the subscription window by `period_days`.
    pub async fn renew_subscription(
        &self,
        user_id: UserId,
        period_days: u32,
    ) -> Result<User, EngineError> {
        if period_days == 0 {
            return Err(EngineError::invalid("renewal period must be at least one day"));
        }
        let secs = i64::from(period_days) * defaults::SECS_PER_DAY;
        let user = users::renew(self.ledger.pool(), user_id, secs, now_unix())
            .await
            .map_err(or_not_found("user"))?;
        info!(user_id = %user.id, end = ?user.subscription_end, "subscription renewed");
        Ok(user)
    }

    /// Current entitlement of a user.
    pub async fn check_entitlement(&self, user_id: UserId) -> Result<Entitlement, EngineError> {
        Ok(self.get_profile(user_id).await?.entitlement)
    }

    pub async fn get_profile(&self, user_id: UserId) -> Result<Profile, EngineError> {
        let user = self.user(user_id).await?;
        let tariff = tariffs::by_id(self.ledger.pool(), user.tariff_id)
            .await?
            .ok_or(EngineError::NotFound("tariff"))?;
        let entitlement = user.entitlement(&tariff, now_unix());
        Ok(Profile {
            user,
            tariff,
            entitlement,
        })
    }

    pub async fn list_tariffs(&self) -> Result<Vec<Tariff>, EngineError> {
        Ok(tariffs::list(self.ledger.pool()).await?)
    }

    pub async fn create_tariff(
        &self,
        name: &str,
        price_cents: i64,
        traffic_limit: u64,
    ) -> Result<Tariff, EngineError> {
        if name.trim().is_empty() {
            return Err(EngineError::invalid("tariff name is empty"));
        }
        if price_cents < 0 {
            return Err(EngineError::invalid("tariff price is negative"));
        }
        let tariff = tariffs::insert(self.ledger.pool(), name, price_cents, traffic_limit).await?;
        info!(tariff_id = %tariff.id, name = %tariff.name, "tariff created");
        Ok(tariff)
    }

    /// Append a payment; a settled payment renews the subscription in the
    /// same transaction.
    pub async fn record_payment(
        &self,
        user_id: UserId,
        amount_cents: i64,
        status: PaymentStatus,
    ) -> Result<Payment, EngineError> {
        if amount_cents <= 0 {
            return Err(EngineError::invalid("payment amount must be positive"));
        }
        let period_secs =
            i64::from(self.settings.subscription_period_days) * defaults::SECS_PER_DAY;
        let now = now_unix();

        let payment = self
            .ledger
            .with_transaction(move |tx| {
                Box::pin(async move {
                    if users::by_id(tx.conn(), user_id).await?.is_none() {
                        return Err(EngineError::NotFound("user"));
                    }
                    let payment =
                        payments::insert(tx.conn(), user_id, amount_cents, status, now).await?;
                    if status == PaymentStatus::Settled {
                        users::renew(tx.conn(), user_id, period_secs, now).await?;
                    }
                    Ok::<_, EngineError>(payment)
                })
            })
            .await?;

        if payment.status == PaymentStatus::Settled {
            vpn_metrics::record_payment_settled();
        }
        info!(
            user_id = %user_id,
            payment_id = %payment.id,
            status = %payment.status,
            amount_cents,
            "payment recorded"
        );
        Ok(payment)
    }

    pub async fn payments(&self, user_id: UserId) -> Result<Vec<Payment>, EngineError> {
        Ok(payments::list_for_user(self.ledger.pool(), user_id).await?)
    }

    /// Replace the password of the account registered with `email`.
    pub async fn reset_password(&self, email: &str, new_password: &str) -> Result<(), EngineError> {
        validate::email(email)?;
        let hash = self.hash_password(new_password).await?;
        if !users::set_password_by_email(self.ledger.pool(), email, &hash).await? {
            return Err(EngineError::NotFound("user"));
        }
        info!(email, "password reset");
        Ok(())
    }
}
