//! Endpoint provisioning for vpn-rs.
//!
//! A user's right to tunnel is represented by one [`Binding`](vpn_ledger::Binding)
//! per backend: a WireGuard peer (public key plus leased `/32` address) or a
//! proxy client (UUID). The [`Provisioner`] allocates these lazily on first
//! connect, mirrors them into the daemons through [`BackendAdapter`]s, and
//! revokes them again.
//!
//! # Backends
//!
//! - [`WireGuardAdapter`]: drives `wg set`/`wg show` and `wg-quick up|down`.
//! - [`ProxyAdapter`]: rewrites a V2Ray/VLESS client document and reloads
//!   the daemon.

mod adapter;
mod error;
mod process;
mod provisioner;

pub mod proxy;
pub mod wireguard;

#[cfg(test)]
mod tests;

pub use adapter::{AdapterPolicy, BackendAdapter, PeerSpec};
pub use error::AdapterError;
pub use provisioner::{Provisioned, Provisioner, ReconcileReport};
pub use proxy::ProxyAdapter;
pub use wireguard::{LeasePool, ServerInfo, WireGuardAdapter, render_wireguard_client_config};
