//! Operator commands.
//!
//! # Usage
//!
//! ```bash
//! # Create the schema and seed the base tariff
//! vpn-rs init -c config.toml
//!
//! # Add a tariff with a 50 GB ceiling, price in cents
//! vpn-rs tariff -c config.toml add premium --price-cents 499 --traffic-limit 50GB
//!
//! # Record a settled payment (extends the subscription)
//! vpn-rs payment -c config.toml --user 7 --amount-cents 499
//!
//! # Make daemon state match the ledger
//! vpn-rs reconcile -c config.toml --backend proxy
//! ```

use std::path::PathBuf;

use clap::{Args, Subcommand};
use tabled::{Table, Tabled};
use vpn_config::CliOverrides;
use vpn_core::{BackendKind, EngineError, UserId};
use vpn_identity::{Argon2JwtCredentials, CredentialService};
use vpn_ledger::{PaymentStatus, Tariff, User};
use vpn_provision::ReconcileReport;

use crate::Engine;
use crate::cli::resolve_config;

/// Secret for the `hash` command, which never issues tokens.
const HASH_ONLY_SECRET: &[u8] = b"vpn-rs-hash-only";

/// Config file plus overrides, shared by commands that open the ledger.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Config file path (json/jsonc/yaml/toml)
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(flatten)]
    pub overrides: CliOverrides,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AdminCommands {
    /// Create the ledger schema and seed the base tariff.
    Init(ConfigArgs),

    /// Manage tariffs.
    Tariff {
        #[command(flatten)]
        cfg: ConfigArgs,
        #[command(subcommand)]
        action: TariffAction,
    },

    /// Inspect users.
    User {
        #[command(flatten)]
        cfg: ConfigArgs,
        #[command(subcommand)]
        action: UserAction,
    },

    /// Record a payment for a user.
    Payment {
        #[command(flatten)]
        cfg: ConfigArgs,

        /// User id.
        #[arg(short, long)]
        user: i64,

        /// Amount in cents.
        #[arg(short, long)]
        amount_cents: i64,

        /// pending, settled or failed.
        #[arg(short, long, default_value = "settled")]
        status: String,
    },

    /// Make backend daemons match the ledger.
    Reconcile {
        #[command(flatten)]
        cfg: ConfigArgs,

        /// Backend to reconcile (wireguard, proxy). Default: all enabled.
        #[arg(short, long)]
        backend: Option<String>,
    },

    /// Bring the WireGuard interface up or down.
    Wireguard {
        #[command(flatten)]
        cfg: ConfigArgs,
        #[command(subcommand)]
        action: WireguardAction,
    },

    /// Print the Argon2id hash of a password.
    Hash {
        /// Password to hash.
        password: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum TariffAction {
    /// Add a tariff.
    Add {
        name: String,

        /// Price in cents.
        #[arg(short, long, default_value = "0")]
        price_cents: i64,

        /// Traffic ceiling (e.g. "10GB", "500MB", "0" for unlimited).
        #[arg(short, long, default_value = "0")]
        traffic_limit: String,
    },
    /// List tariffs.
    List {
        /// Output format (table, json).
        #[arg(short, long, default_value = "table")]
        format: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum UserAction {
    /// List users.
    List {
        #[arg(long, default_value = "100")]
        limit: i64,
        #[arg(long, default_value = "0")]
        offset: i64,
        /// Output format (table, json).
        #[arg(short, long, default_value = "table")]
        format: String,
    },
    /// Show one user's profile and endpoints.
    Show {
        /// User id.
        id: i64,
    },
    /// Revoke all endpoints of a user.
    Deprovision {
        /// User id.
        id: i64,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum WireguardAction {
    Up,
    Down,
}

#[derive(Tabled)]
struct TariffRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Traffic Limit")]
    traffic_limit: String,
}

impl From<&Tariff> for TariffRow {
    fn from(t: &Tariff) -> Self {
        Self {
            id: t.id.get(),
            name: t.name.clone(),
            price: format_cents(t.price_cents),
            traffic_limit: format_traffic_limit(t.traffic_limit),
        }
    }
}

#[derive(Tabled)]
struct UserRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Username")]
    username: String,
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "Traffic Used")]
    used: String,
    #[tabled(rename = "Subscription End")]
    subscription_end: String,
}

impl From<&User> for UserRow {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.get(),
            username: u.username.clone(),
            email: u.email.clone(),
            used: format_bytes(u.used_traffic),
            subscription_end: u
                .subscription_end
                .map_or_else(|| "-".to_string(), |ts| ts.to_string()),
        }
    }
}

#[derive(Tabled)]
struct ReconcileRow {
    #[tabled(rename = "Backend")]
    backend: String,
    #[tabled(rename = "Applied")]
    applied: usize,
    #[tabled(rename = "Removed")]
    removed: usize,
    #[tabled(rename = "Failed")]
    failed: usize,
}

impl From<&ReconcileReport> for ReconcileRow {
    fn from(r: &ReconcileReport) -> Self {
        Self {
            backend: r.backend.map_or_else(|| "-".to_string(), |b| b.to_string()),
            applied: r.applied,
            removed: r.removed,
            failed: r.failed,
        }
    }
}

async fn open(cfg: &ConfigArgs) -> Result<Engine, Box<dyn std::error::Error>> {
    let config = resolve_config(&cfg.config, &cfg.overrides)?;
    Ok(Engine::open(config).await?)
}

/// Run an operator command.
pub async fn run(command: AdminCommands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        AdminCommands::Hash { password } => {
            let creds = Argon2JwtCredentials::new(HASH_ONLY_SECRET)?;
            println!("{}", creds.hash(&password)?);
            Ok(())
        }
        AdminCommands::Init(cfg) => {
            let engine = open(&cfg).await?;
            let tariffs = engine.list_tariffs().await?;
            println!("Ledger schema ready.");
            println!("  Base tariff: {}", engine.config().engine.base_tariff);
            println!("  Tariffs: {}", tariffs.len());
            engine.ledger().close().await;
            Ok(())
        }
        AdminCommands::Tariff { cfg, action } => {
            let engine = open(&cfg).await?;
            let result = tariff(&engine, action).await;
            engine.ledger().close().await;
            result
        }
        AdminCommands::User { cfg, action } => {
            let engine = open(&cfg).await?;
            let result = user(&engine, action).await;
            engine.ledger().close().await;
            result
        }
        AdminCommands::Payment {
            cfg,
            user,
            amount_cents,
            status,
        } => {
            let status: PaymentStatus = status.parse().map_err(EngineError::invalid)?;
            let engine = open(&cfg).await?;
            let payment = engine
                .record_payment(UserId(user), amount_cents, status)
                .await?;
            let profile = engine.get_profile(UserId(user)).await?;
            println!("Payment {} recorded ({}).", payment.id, payment.status);
            println!("  Amount: {}", format_cents(payment.amount_cents));
            println!("  Entitlement: {}", profile.entitlement);
            engine.ledger().close().await;
            Ok(())
        }
        AdminCommands::Reconcile { cfg, backend } => {
            let engine = open(&cfg).await?;
            let reports = match backend {
                Some(name) => {
                    let kind: BackendKind = name.parse().map_err(EngineError::InvalidInput)?;
                    vec![engine.reconcile(kind).await?]
                }
                None => engine.reconcile_all().await?,
            };
            let rows: Vec<ReconcileRow> = reports.iter().map(ReconcileRow::from).collect();
            println!("{}", Table::new(rows));
            engine.ledger().close().await;
            Ok(())
        }
        AdminCommands::Wireguard { cfg, action } => {
            let engine = open(&cfg).await?;
            let adapter = engine.provisioner().adapter(BackendKind::WireGuard)?;
            match action {
                WireguardAction::Up => adapter.start().await.map_err(EngineError::from)?,
                WireguardAction::Down => adapter.stop().await.map_err(EngineError::from)?,
            }
            println!("WireGuard interface {}.", match action {
                WireguardAction::Up => "up",
                WireguardAction::Down => "down",
            });
            engine.ledger().close().await;
            Ok(())
        }
    }
}

async fn tariff(engine: &Engine, action: TariffAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        TariffAction::Add {
            name,
            price_cents,
            traffic_limit,
        } => {
            let limit = parse_traffic(&traffic_limit)?;
            let tariff = engine
                .identity()
                .create_tariff(&name, price_cents, limit)
                .await?;
            println!("Tariff {} added (id {}).", tariff.name, tariff.id);
            println!("  Price: {}", format_cents(tariff.price_cents));
            println!("  Traffic limit: {}", format_traffic_limit(tariff.traffic_limit));
        }
        TariffAction::List { format } => {
            let tariffs = engine.list_tariffs().await?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&tariffs)?);
            } else {
                let rows: Vec<TariffRow> = tariffs.iter().map(TariffRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }
    }
    Ok(())
}

async fn user(engine: &Engine, action: UserAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        UserAction::List {
            limit,
            offset,
            format,
        } => {
            let users = engine.identity().list_users(limit, offset).await?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&users)?);
            } else {
                let rows: Vec<UserRow> = users.iter().map(UserRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }
        UserAction::Show { id } => {
            let profile = engine.get_profile(UserId(id)).await?;
            let bindings = engine.provisioner().bindings_for(UserId(id)).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "profile": profile,
                    "endpoints": bindings,
                }))?
            );
        }
        UserAction::Deprovision { id } => {
            let removed = engine.deprovision_user(UserId(id)).await?;
            println!("Revoked {removed} endpoint(s).");
        }
    }
    Ok(())
}

/// Parse a traffic size ("10GB", "500MB", "1.5TB", "0") to bytes.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn parse_traffic(s: &str) -> Result<u64, Box<dyn std::error::Error>> {
    let s = s.trim().to_uppercase();
    if s.is_empty() || s == "0" {
        return Ok(0);
    }
    let units: [(&str, u64); 5] = [
        ("TB", 1 << 40),
        ("GB", 1 << 30),
        ("MB", 1 << 20),
        ("KB", 1 << 10),
        ("B", 1),
    ];
    let (num, unit) = units
        .iter()
        .find_map(|(suffix, unit)| s.strip_suffix(suffix).map(|n| (n, *unit)))
        .unwrap_or((s.as_str(), 1));
    let value: f64 = num.trim().parse()?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("invalid traffic size: {s}").into());
    }
    Ok((value * unit as f64) as u64)
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1 << 10;
    const MB: u64 = 1 << 20;
    const GB: u64 = 1 << 30;
    const TB: u64 = 1 << 40;

    match bytes {
        b if b >= TB => format!("{:.2} TB", b as f64 / TB as f64),
        b if b >= GB => format!("{:.2} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.2} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.2} KB", b as f64 / KB as f64),
        b => format!("{b} B"),
    }
}

fn format_traffic_limit(bytes: u64) -> String {
    if bytes == 0 {
        "Unlimited".to_string()
    } else {
        format_bytes(bytes)
    }
}

fn format_cents(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, (cents % 100).abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_traffic_units() {
        assert_eq!(parse_traffic("0").unwrap(), 0);
        assert_eq!(parse_traffic("512").unwrap(), 512);
        assert_eq!(parse_traffic("10gb").unwrap(), 10 << 30);
        assert_eq!(parse_traffic("1.5 MB").unwrap(), 3 << 19);
        assert!(parse_traffic("lots").is_err());
        assert!(parse_traffic("-1GB").is_err());
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1 << 30), "1.00 GB");
        assert_eq!(format_traffic_limit(0), "Unlimited");
        assert_eq!(format_cents(499), "4.99");
        assert_eq!(format_cents(1000), "10.00");
    }
}
