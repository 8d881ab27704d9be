//! Configuration loading and CLI definitions.
//!
//! A single [`Config`] document drives the engine: ledger connection, entitlement
//! policy, the enabled backends, token signing, metrics and logging. Files may
//! be JSON (with comments), YAML or TOML.

mod cli;
mod defaults;
mod loader;
mod types;
mod validate;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use cli::{CliOverrides, apply_overrides};
pub use loader::{ConfigError, load_config, parse_config};
pub use types::*;
pub use validate::validate_config;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub wireguard: Option<WireGuardConfig>,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs)
    }

    pub fn adapter_retry_delay(&self) -> Duration {
        Duration::from_millis(self.adapter_retry_delay_ms)
    }

    /// Length of one subscription period in seconds.
    pub fn subscription_period_secs(&self) -> i64 {
        i64::from(self.subscription_period_days) * vpn_core::defaults::SECS_PER_DAY
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn write_tmp(ext: &str, body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{}", ext))
            .tempfile()
            .unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    fn minimal() -> Config {
        parse_config(
            &format!(
                r#"{{
                    "database": {{ "url": "sqlite::memory:" }},
                    "wireguard": {{}},
                    "auth": {{ "jwt_secret": "{SECRET}" }}
                }}"#
            ),
            "json",
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_are_filled_in() {
        let cfg = minimal();
        assert_eq!(cfg.engine.base_tariff, "free");
        assert_eq!(cfg.engine.subscription_period_days, 30);
        assert_eq!(cfg.engine.subscription_period_secs(), 30 * 86_400);
        assert_eq!(cfg.database.max_connections, 10);
        let wg = cfg.wireguard.as_ref().unwrap();
        assert_eq!(wg.interface, "wg0");
        assert_eq!(wg.address_pool, "10.8.0.0/24");
        assert!(cfg.proxy.is_none());
        assert_eq!(cfg.auth.token_ttl_secs, 86_400);
        validate_config(&cfg).unwrap();
    }

    #[test]
    fn test_load_jsonc_with_comments() {
        let file = write_tmp(
            "jsonc",
            &format!(
                r#"{{
                    // ledger
                    "database": {{ "url": "postgres://vpn@localhost/vpn" }},
                    /* proxy only */
                    "proxy": {{ "config_path": "/tmp/v2ray.json", "reload_command": "true" }},
                    "auth": {{ "jwt_secret": "{SECRET}" }}
                }}"#
            ),
        );
        let cfg = load_config(file.path()).unwrap();
        let proxy = cfg.proxy.as_ref().unwrap();
        assert_eq!(proxy.reload_command, "true");
        assert_eq!(proxy.email_domain, "vpn.local");
        validate_config(&cfg).unwrap();
    }

    #[test]
    fn test_load_yaml_and_toml() {
        let yaml = write_tmp(
            "yaml",
            &format!(
                "database:\n  url: \"sqlite:vpn.db\"\nwireguard:\n  interface: wg1\nauth:\n  jwt_secret: \"{SECRET}\"\nengine:\n  subscription_period_days: 7\n"
            ),
        );
        let cfg = load_config(yaml.path()).unwrap();
        assert_eq!(cfg.wireguard.unwrap().interface, "wg1");
        assert_eq!(cfg.engine.subscription_period_days, 7);

        let toml = write_tmp(
            "toml",
            &format!(
                "[database]\nurl = \"sqlite:vpn.db\"\n\n[proxy]\n\n[auth]\njwt_secret = \"{SECRET}\"\n\n[logging]\nlevel = \"debug\"\n"
            ),
        );
        let cfg = load_config(toml.path()).unwrap();
        assert!(cfg.proxy.is_some());
        assert_eq!(cfg.logging.level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let file = write_tmp("ini", "x=1");
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::UnsupportedFormat(ext)) if ext == "ini"
        ));
    }

    #[test]
    fn test_validation_catches_bad_values() {
        let mut cfg = minimal();
        cfg.wireguard = None;
        assert!(validate_config(&cfg).is_err(), "no backend configured");

        let mut cfg = minimal();
        cfg.auth.jwt_secret = "short".into();
        assert!(validate_config(&cfg).is_err());

        let mut cfg = minimal();
        cfg.database.url = "mysql://localhost/vpn".into();
        assert!(validate_config(&cfg).is_err());

        let mut cfg = minimal();
        cfg.wireguard.as_mut().unwrap().address_pool = "10.8.0.0/31".into();
        assert!(validate_config(&cfg).is_err());

        let mut cfg = minimal();
        cfg.wireguard.as_mut().unwrap().address_pool = "not-a-net".into();
        assert!(validate_config(&cfg).is_err());

        let mut cfg = minimal();
        cfg.engine.adapter_retry_delay_ms = 60_000;
        assert!(validate_config(&cfg).is_err());

        let mut cfg = minimal();
        cfg.logging.format = Some("xml".into());
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_overrides_enable_backends_and_replace_values() {
        let mut cfg = minimal();
        let overrides = CliOverrides {
            database_url: Some("postgres://db/vpn".into()),
            proxy_config: Some("/srv/v2ray.json".into()),
            no_reconcile: true,
            log_level: Some("warn".into()),
            ..Default::default()
        };
        apply_overrides(&mut cfg, &overrides);
        assert_eq!(cfg.database.url, "postgres://db/vpn");
        assert_eq!(
            cfg.proxy.as_ref().unwrap().config_path,
            std::path::PathBuf::from("/srv/v2ray.json")
        );
        assert!(!cfg.engine.reconcile_on_start);
        assert_eq!(cfg.logging.level.as_deref(), Some("warn"));
        validate_config(&cfg).unwrap();
    }
}
