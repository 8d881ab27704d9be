//! Default configuration values.
//!
//! Centralized default constants for use across all crates.

// ============================================================================
// Ledger Defaults
// ============================================================================

/// Default maximum pooled database connections.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
/// Default minimum pooled database connections.
pub const DEFAULT_DB_MIN_CONNECTIONS: u32 = 1;
/// Default connection acquire timeout in seconds.
pub const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 10;
/// Default maximum connection lifetime in seconds (30 minutes).
pub const DEFAULT_DB_MAX_LIFETIME_SECS: u64 = 1800;
/// Default idle connection timeout in seconds (10 minutes).
pub const DEFAULT_DB_IDLE_TIMEOUT_SECS: u64 = 600;

// ============================================================================
// Tariff / Subscription Defaults
// ============================================================================

/// Name of the tariff assigned to newly registered users.
pub const DEFAULT_BASE_TARIFF_NAME: &str = "free";
/// Traffic ceiling of the seeded base tariff (1 GiB).
pub const DEFAULT_BASE_TARIFF_LIMIT_BYTES: u64 = 1 << 30;
/// Subscription extension granted by one settled payment.
pub const DEFAULT_SUBSCRIPTION_PERIOD_DAYS: u32 = 30;
/// Seconds per day.
pub const SECS_PER_DAY: i64 = 86_400;

// ============================================================================
// Accounting Defaults
// ============================================================================

/// Largest usage delta accepted from a single report (1 TiB).
pub const DEFAULT_MAX_USAGE_DELTA_BYTES: u64 = 1 << 40;
/// Deadline for a whole connect/disconnect operation in seconds.
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Adapter Defaults
// ============================================================================

/// Deadline for a single adapter call in seconds.
pub const DEFAULT_ADAPTER_TIMEOUT_SECS: u64 = 10;
/// Delay before the single retry of a transient adapter failure (ms).
pub const DEFAULT_ADAPTER_RETRY_DELAY_MS: u64 = 250;
/// Attempts to allocate a free lease before giving up.
pub const LEASE_ALLOCATION_ATTEMPTS: usize = 3;

// ============================================================================
// WireGuard Defaults
// ============================================================================

/// Default WireGuard interface name.
pub const DEFAULT_WG_INTERFACE: &str = "wg0";
/// Default private pool leased to WireGuard peers.
pub const DEFAULT_WG_ADDRESS_POOL: &str = "10.8.0.0/24";
/// Default DNS server written into client configs.
pub const DEFAULT_WG_CLIENT_DNS: &str = "8.8.8.8";
/// Default persistent keepalive written into client configs.
pub const DEFAULT_WG_KEEPALIVE_SECS: u16 = 25;

// ============================================================================
// Proxy (V2Ray/VLESS) Defaults
// ============================================================================

/// Default proxy client document path.
pub const DEFAULT_PROXY_CONFIG_PATH: &str = "/etc/v2ray/config.json";
/// Default reload command for the proxy daemon.
pub const DEFAULT_PROXY_RELOAD_COMMAND: &str = "systemctl reload v2ray";
/// Default start command for the proxy daemon.
pub const DEFAULT_PROXY_START_COMMAND: &str = "systemctl start v2ray";
/// Default email tag appended to proxy client entries.
pub const DEFAULT_PROXY_EMAIL_DOMAIN: &str = "vpn.local";

// ============================================================================
// Credential Defaults
// ============================================================================

/// Default bearer token lifetime in seconds (24 hours).
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 86_400;
/// Default JWT issuer claim.
pub const DEFAULT_TOKEN_ISSUER: &str = "vpn-rs";
