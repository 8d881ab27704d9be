//! Typed ledger records.
//!
//! Counters are stored as signed `BIGINT` columns and exposed as `u64`.
//! Timestamps are Unix seconds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::any::AnyRow;
use vpn_core::{BackendKind, Entitlement, PaymentId, SessionId, TariffId, UserId};

#[inline]
#[allow(clippy::cast_sign_loss)]
fn counter(v: i64) -> u64 {
    v.max(0) as u64
}

fn decode_err(msg: String) -> sqlx::Error {
    sqlx::Error::Decode(msg.into())
}

/// Registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub external_id: Option<String>,
    pub tariff_id: TariffId,
    pub used_traffic: u64,
    pub subscription_start: Option<i64>,
    pub subscription_end: Option<i64>,
    pub created_at: i64,
}

impl User {
    /// Entitlement of this user under `tariff` at `now`.
    pub fn entitlement(&self, tariff: &Tariff, now: i64) -> Entitlement {
        Entitlement::evaluate(
            now,
            self.subscription_end,
            tariff.traffic_limit,
            self.used_traffic,
        )
    }
}

impl<'r> sqlx::FromRow<'r, AnyRow> for User {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: UserId(row.try_get("id")?),
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            external_id: row.try_get("external_id")?,
            tariff_id: TariffId(row.try_get("tariff_id")?),
            used_traffic: counter(row.try_get("used_traffic")?),
            subscription_start: row.try_get("subscription_start")?,
            subscription_end: row.try_get("subscription_end")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Fields supplied when creating a user.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub tariff_id: TariffId,
}

/// Plan reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tariff {
    pub id: TariffId,
    pub name: String,
    /// Price in minor currency units.
    pub price_cents: i64,
    /// Traffic ceiling in bytes; 0 means unlimited.
    pub traffic_limit: u64,
}

impl Tariff {
    #[inline]
    pub fn is_unlimited(&self) -> bool {
        self.traffic_limit == 0
    }
}

impl<'r> sqlx::FromRow<'r, AnyRow> for Tariff {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: TariffId(row.try_get("id")?),
            name: row.try_get("name")?,
            price_cents: row.try_get("price_cents")?,
            traffic_limit: counter(row.try_get("traffic_limit")?),
        })
    }
}

/// Payment lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Settled,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Settled => "settled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "settled" | "completed" | "paid" => Ok(Self::Settled),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// Append-only payment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payment {
    pub id: PaymentId,
    pub user_id: UserId,
    pub amount_cents: i64,
    pub status: PaymentStatus,
    pub created_at: i64,
}

impl<'r> sqlx::FromRow<'r, AnyRow> for Payment {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: PaymentId(row.try_get("id")?),
            user_id: UserId(row.try_get("user_id")?),
            amount_cents: row.try_get("amount_cents")?,
            status: status.parse().map_err(decode_err)?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// One connection interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub start_time: i64,
    /// `None` while the session is open.
    pub end_time: Option<i64>,
    pub data_usage: u64,
}

impl Session {
    #[inline]
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Seconds between start and end (or `now` for an open session).
    #[allow(clippy::cast_sign_loss)]
    pub fn duration_secs(&self, now: i64) -> u64 {
        (self.end_time.unwrap_or(now) - self.start_time).max(0) as u64
    }
}

impl<'r> sqlx::FromRow<'r, AnyRow> for Session {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: SessionId(row.try_get("id")?),
            user_id: UserId(row.try_get("user_id")?),
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            data_usage: counter(row.try_get("data_usage")?),
        })
    }
}

/// Per-user, per-backend credential mirrored into a live daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub user_id: UserId,
    pub backend: BackendKind,
    /// WireGuard public key or proxy client UUID.
    pub credential: String,
    /// Leased `/32` address (WireGuard only).
    pub leased_address: Option<String>,
    pub created_at: i64,
}

impl<'r> sqlx::FromRow<'r, AnyRow> for Binding {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        let backend: String = row.try_get("backend")?;
        Ok(Self {
            user_id: UserId(row.try_get("user_id")?),
            backend: backend.parse().map_err(decode_err)?,
            credential: row.try_get("credential")?,
            leased_address: row.try_get("leased_address")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
