//! CLI override definitions and application logic.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;
use crate::types::*;

#[derive(Debug, Clone, Parser, Default)]
pub struct CliOverrides {
    /// Override database URL
    #[arg(long, env = "VPN_DATABASE_URL")]
    pub database_url: Option<String>,
    /// Override maximum pooled database connections
    #[arg(long)]
    pub db_max_connections: Option<u32>,
    /// Override token signing secret
    #[arg(long, env = "VPN_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,
    /// Override connect/disconnect deadline (seconds)
    #[arg(long)]
    pub operation_timeout_secs: Option<u64>,
    /// Override per-call adapter deadline (seconds)
    #[arg(long)]
    pub adapter_timeout_secs: Option<u64>,
    /// Skip backend reconciliation at startup
    #[arg(long)]
    pub no_reconcile: bool,
    /// Override WireGuard interface (enables the WireGuard backend)
    #[arg(long)]
    pub wg_interface: Option<String>,
    /// Override WireGuard address pool (CIDR)
    #[arg(long)]
    pub wg_address_pool: Option<String>,
    /// Override proxy client document path (enables the proxy backend)
    #[arg(long)]
    pub proxy_config: Option<PathBuf>,
    /// Override proxy reload command
    #[arg(long)]
    pub proxy_reload_command: Option<String>,
    /// Override metrics listen address
    #[arg(long)]
    pub metrics_listen: Option<String>,
    /// Override log level (trace/debug/info/warn/error)
    #[arg(long)]
    pub log_level: Option<String>,
    /// Override log format (json/pretty/compact)
    #[arg(long)]
    pub log_format: Option<String>,
}

pub fn apply_overrides(config: &mut Config, overrides: &CliOverrides) {
    if let Some(v) = &overrides.database_url {
        config.database.url = v.clone();
    }
    if let Some(v) = overrides.db_max_connections {
        config.database.max_connections = v;
    }
    if let Some(v) = &overrides.jwt_secret {
        config.auth.jwt_secret = v.clone();
    }
    if let Some(v) = overrides.operation_timeout_secs {
        config.engine.operation_timeout_secs = v;
    }
    if let Some(v) = overrides.adapter_timeout_secs {
        config.engine.adapter_timeout_secs = v;
    }
    if overrides.no_reconcile {
        config.engine.reconcile_on_start = false;
    }
    if overrides.wg_interface.is_some() || overrides.wg_address_pool.is_some() {
        let wg = config.wireguard.get_or_insert_with(WireGuardConfig::default);
        if let Some(v) = &overrides.wg_interface {
            wg.interface = v.clone();
        }
        if let Some(v) = &overrides.wg_address_pool {
            wg.address_pool = v.clone();
        }
    }
    if overrides.proxy_config.is_some() || overrides.proxy_reload_command.is_some() {
        let proxy = config.proxy.get_or_insert_with(ProxyConfig::default);
        if let Some(v) = &overrides.proxy_config {
            proxy.config_path = v.clone();
        }
        if let Some(v) = &overrides.proxy_reload_command {
            proxy.reload_command = v.clone();
        }
    }
    if let Some(v) = &overrides.metrics_listen {
        config.metrics.listen = Some(v.clone());
    }
    if let Some(v) = &overrides.log_level {
        config.logging.level = Some(v.clone());
    }
    if let Some(v) = &overrides.log_format {
        config.logging.format = Some(v.clone());
    }
}
