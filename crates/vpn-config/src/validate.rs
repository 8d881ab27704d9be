//! Configuration validation logic.

use ipnet::Ipv4Net;

use crate::Config;
use crate::loader::ConfigError;

/// Smallest pool that still leaves room for one peer after the network,
/// gateway and broadcast addresses are reserved.
const MAX_POOL_PREFIX_LEN: u8 = 30;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 3] = ["json", "pretty", "compact"];
const LOG_OUTPUTS: [&str; 2] = ["stdout", "stderr"];

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let url = config.database.url.trim();
    if url.is_empty() {
        return Err(ConfigError::Validation("database.url is empty".into()));
    }
    if !(url.starts_with("postgres://")
        || url.starts_with("postgresql://")
        || url.starts_with("sqlite:"))
    {
        return Err(ConfigError::Validation(
            "database.url must be a postgres:// or sqlite: URL".into(),
        ));
    }
    if config.database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be > 0".into(),
        ));
    }
    if config.database.min_connections > config.database.max_connections {
        return Err(ConfigError::Validation(
            "database.min_connections must be <= max_connections".into(),
        ));
    }
    if config.database.acquire_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "database.acquire_timeout_secs must be > 0".into(),
        ));
    }

    let engine = &config.engine;
    if engine.base_tariff.trim().is_empty() {
        return Err(ConfigError::Validation("engine.base_tariff is empty".into()));
    }
    if engine.subscription_period_days == 0 {
        return Err(ConfigError::Validation(
            "engine.subscription_period_days must be > 0".into(),
        ));
    }
    if engine.max_usage_delta_bytes == 0 || engine.max_usage_delta_bytes > i64::MAX as u64 {
        return Err(ConfigError::Validation(
            "engine.max_usage_delta_bytes must be 1..=i64::MAX".into(),
        ));
    }
    if engine.operation_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "engine.operation_timeout_secs must be > 0".into(),
        ));
    }
    if engine.adapter_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "engine.adapter_timeout_secs must be > 0".into(),
        ));
    }
    if engine.adapter_retry_delay_ms >= engine.adapter_timeout_secs.saturating_mul(1000) {
        return Err(ConfigError::Validation(
            "engine.adapter_retry_delay_ms must be shorter than adapter_timeout_secs".into(),
        ));
    }

    if config.wireguard.is_none() && config.proxy.is_none() {
        return Err(ConfigError::Validation(
            "at least one of 'wireguard' or 'proxy' must be configured".into(),
        ));
    }
    if let Some(ref wg) = config.wireguard {
        if wg.interface.trim().is_empty() {
            return Err(ConfigError::Validation("wireguard.interface is empty".into()));
        }
        let pool: Ipv4Net = wg.address_pool.parse().map_err(|_| {
            ConfigError::Validation(format!(
                "wireguard.address_pool is not an IPv4 CIDR: {}",
                wg.address_pool
            ))
        })?;
        if pool.prefix_len() > MAX_POOL_PREFIX_LEN {
            return Err(ConfigError::Validation(format!(
                "wireguard.address_pool prefix must be /{} or wider",
                MAX_POOL_PREFIX_LEN
            )));
        }
        if wg.wg_binary.trim().is_empty() {
            return Err(ConfigError::Validation("wireguard.wg_binary is empty".into()));
        }
    }
    if let Some(ref proxy) = config.proxy {
        if proxy.config_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation("proxy.config_path is empty".into()));
        }
        if proxy.reload_command.trim().is_empty() {
            return Err(ConfigError::Validation("proxy.reload_command is empty".into()));
        }
        if proxy.email_domain.trim().is_empty() {
            return Err(ConfigError::Validation("proxy.email_domain is empty".into()));
        }
    }

    // HS256 keys shorter than the hash output are brute-forceable.
    if config.auth.jwt_secret.len() < 32 {
        return Err(ConfigError::Validation(
            "auth.jwt_secret must be at least 32 bytes".into(),
        ));
    }
    if config.auth.token_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "auth.token_ttl_secs must be > 0".into(),
        ));
    }

    if let Some(ref listen) = config.metrics.listen
        && listen.parse::<std::net::SocketAddr>().is_err()
    {
        return Err(ConfigError::Validation(format!(
            "metrics.listen is not a socket address: {}",
            listen
        )));
    }
    if let Some(ref level) = config.logging.level
        && !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str())
    {
        return Err(ConfigError::Validation(format!(
            "logging.level must be one of: {:?}",
            LOG_LEVELS
        )));
    }
    if let Some(ref format) = config.logging.format
        && !LOG_FORMATS.contains(&format.as_str())
    {
        return Err(ConfigError::Validation(format!(
            "logging.format must be one of: {:?}",
            LOG_FORMATS
        )));
    }
    if let Some(ref output) = config.logging.output
        && !LOG_OUTPUTS.contains(&output.as_str())
    {
        return Err(ConfigError::Validation(format!(
            "logging.output must be one of: {:?}",
            LOG_OUTPUTS
        )));
    }
    Ok(())
}
