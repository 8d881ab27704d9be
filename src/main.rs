//! Unified vpn-rs CLI.
//!
//! - `vpn-rs serve` runs the engine until SIGTERM/SIGINT
//! - `vpn-rs init|tariff|user|payment|reconcile|wireguard|hash` are
//!   operator commands against the same configuration

use std::process::ExitCode;

use clap::{Parser, Subcommand};

/// vpn-rs unified CLI.
#[derive(Parser)]
#[command(
    name = "vpn-rs",
    version,
    about = "VPN endpoint provisioning and session accounting engine",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine service.
    #[command(name = "serve", alias = "run")]
    Serve(Box<vpn_engine::EngineArgs>),

    #[command(flatten)]
    Admin(vpn_engine::AdminCommands),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve(args) => vpn_engine::cli::run(*args).await,
        Commands::Admin(cmd) => vpn_engine::admin::run(cmd).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
