//! Session accounting for vpn-rs.
//!
//! Each user is either disconnected or holds exactly one open session.
//! [`SessionService::connect`] gates on entitlement, provisions an endpoint
//! on every enabled backend and opens the session;
//! [`SessionService::disconnect`] closes it and charges the traffic in one
//! ledger transaction, revoking endpoints once the user is no longer
//! entitled.

mod registry;
mod service;


pub use registry::ActiveSessions;
pub use service::{Connection, SessionService, SessionSettings};
