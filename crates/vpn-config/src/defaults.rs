//! Default value functions for serde deserialization.
//!
//! These functions forward to constants defined in `vpn_core::defaults`.

use std::path::PathBuf;

use vpn_core::defaults;

/// Generate default value functions that forward to vpn_core::defaults constants.
macro_rules! default_fns {
    // For Copy types (integers, bool, etc.)
    ($($fn_name:ident => $const_name:ident : $ty:ty),* $(,)?) => {
        $(
            pub(crate) fn $fn_name() -> $ty {
                defaults::$const_name
            }
        )*
    };
}

/// Generate default value functions that return String from &str constants.
macro_rules! default_string_fns {
    ($($fn_name:ident => $const_name:ident),* $(,)?) => {
        $(
            pub(crate) fn $fn_name() -> String {
                defaults::$const_name.to_string()
            }
        )*
    };
}

default_fns! {
    default_db_max_connections        => DEFAULT_DB_MAX_CONNECTIONS: u32,
    default_db_min_connections        => DEFAULT_DB_MIN_CONNECTIONS: u32,
    default_db_acquire_timeout_secs   => DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64,
    default_db_max_lifetime_secs      => DEFAULT_DB_MAX_LIFETIME_SECS: u64,
    default_db_idle_timeout_secs      => DEFAULT_DB_IDLE_TIMEOUT_SECS: u64,
    default_base_tariff_limit_bytes   => DEFAULT_BASE_TARIFF_LIMIT_BYTES: u64,
    default_subscription_period_days  => DEFAULT_SUBSCRIPTION_PERIOD_DAYS: u32,
    default_max_usage_delta_bytes     => DEFAULT_MAX_USAGE_DELTA_BYTES: u64,
    default_operation_timeout_secs    => DEFAULT_OPERATION_TIMEOUT_SECS: u64,
    default_adapter_timeout_secs      => DEFAULT_ADAPTER_TIMEOUT_SECS: u64,
    default_adapter_retry_delay_ms    => DEFAULT_ADAPTER_RETRY_DELAY_MS: u64,
    default_wg_keepalive_secs         => DEFAULT_WG_KEEPALIVE_SECS: u16,
    default_token_ttl_secs            => DEFAULT_TOKEN_TTL_SECS: u64,
}

default_string_fns! {
    default_base_tariff          => DEFAULT_BASE_TARIFF_NAME,
    default_wg_interface         => DEFAULT_WG_INTERFACE,
    default_wg_address_pool      => DEFAULT_WG_ADDRESS_POOL,
    default_wg_client_dns        => DEFAULT_WG_CLIENT_DNS,
    default_proxy_reload_command => DEFAULT_PROXY_RELOAD_COMMAND,
    default_proxy_email_domain   => DEFAULT_PROXY_EMAIL_DOMAIN,
    default_token_issuer         => DEFAULT_TOKEN_ISSUER,
}

pub(crate) fn default_reconcile_on_start() -> bool {
    true
}

pub(crate) fn default_wg_binary() -> String {
    "wg".to_string()
}

pub(crate) fn default_wg_quick_binary() -> String {
    "wg-quick".to_string()
}

pub(crate) fn default_proxy_config_path() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_PROXY_CONFIG_PATH)
}
