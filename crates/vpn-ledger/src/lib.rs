//! Durable ledger for vpn-rs.
//!
//! Stores users, tariffs, payments, sessions and endpoint bindings in
//! PostgreSQL or SQLite through the SQLx `Any` driver. The schema enforces
//! the invariants the services rely on:
//!
//! - unique username, email and external identity per user
//! - at most one open session per user (partial unique index)
//! - unique credential and leased address per binding
//!
//! # Database Schema
//!
//! ```sql
//! CREATE TABLE tariffs (id BIGSERIAL PRIMARY KEY, name TEXT UNIQUE, price_cents BIGINT, traffic_limit BIGINT);
//! CREATE TABLE users (id BIGSERIAL PRIMARY KEY, username TEXT UNIQUE, email TEXT UNIQUE,
//!     password_hash TEXT, external_id TEXT UNIQUE, tariff_id BIGINT, used_traffic BIGINT,
//!     subscription_start BIGINT, subscription_end BIGINT, created_at BIGINT);
//! CREATE TABLE payments (id BIGSERIAL PRIMARY KEY, user_id BIGINT, amount_cents BIGINT, status TEXT, created_at BIGINT);
//! CREATE TABLE sessions (id BIGSERIAL PRIMARY KEY, user_id BIGINT, start_time BIGINT, end_time BIGINT, data_usage BIGINT);
//! CREATE UNIQUE INDEX sessions_one_open_per_user ON sessions (user_id) WHERE end_time IS NULL;
//! CREATE TABLE endpoint_bindings (user_id BIGINT, backend TEXT, credential TEXT, leased_address TEXT,
//!     created_at BIGINT, PRIMARY KEY (user_id, backend));
//! ```

mod backend;
mod config;
mod error;
mod queries;
mod records;
mod schema;
mod tx;

pub mod repo;


pub use backend::{DatabaseType, SqlLedger};
pub use config::LedgerConfig;
pub use error::LedgerError;
pub use records::{Binding, NewUser, Payment, PaymentStatus, Session, Tariff, User};
pub use tx::LedgerTx;
