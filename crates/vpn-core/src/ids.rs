//! Typed identifiers and small shared enums.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(pub i64);

            impl $name {
                /// Raw database value.
                #[inline]
                pub fn get(self) -> i64 {
                    self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl From<i64> for $name {
                fn from(v: i64) -> Self {
                    Self(v)
                }
            }
        )*
    };
}

id_type! {
    /// User primary key.
    UserId,
    /// Tariff primary key.
    TariffId,
    /// Session primary key.
    SessionId,
    /// Payment primary key.
    PaymentId,
}

/// Tunnel backend a binding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Kernel/daemon WireGuard peer table.
    WireGuard,
    /// V2Ray/VLESS client list in a config document.
    Proxy,
}

impl BackendKind {
    /// All backend kinds, in provisioning order.
    pub const ALL: [BackendKind; 2] = [BackendKind::WireGuard, BackendKind::Proxy];

    /// Value stored in the `backend` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WireGuard => "wireguard",
            Self::Proxy => "proxy",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wireguard" | "wg" => Ok(Self::WireGuard),
            "proxy" | "v2ray" | "vless" => Ok(Self::Proxy),
            other => Err(format!("unknown backend kind: {other}")),
        }
    }
}

/// Result of an entitlement check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entitlement {
    /// Subscription window open and quota not exhausted.
    Active,
    /// Subscription window closed (or never opened).
    Expired,
    /// Traffic ceiling reached.
    QuotaExceeded,
}

impl Entitlement {
    /// Evaluate entitlement from raw values.
    ///
    /// `traffic_limit == 0` means unlimited. Quota takes precedence over
    /// expiry when both fail.
    pub fn evaluate(
        now: i64,
        subscription_end: Option<i64>,
        traffic_limit: u64,
        used_traffic: u64,
    ) -> Self {
        if traffic_limit > 0 && used_traffic >= traffic_limit {
            return Self::QuotaExceeded;
        }
        match subscription_end {
            Some(end) if now < end => Self::Active,
            _ => Self::Expired,
        }
    }

    #[inline]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for Entitlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::QuotaExceeded => "quota exceeded",
        })
    }
}
