//! Metrics collection and Prometheus exporter for vpn-rs.
//!
//! This module provides metrics instrumentation for the engine, including
//! registrations, session lifecycle, accounted traffic, provisioning and
//! adapter outcomes.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize Prometheus metrics exporter.
///
/// Starts an HTTP server on the given address to expose metrics.
/// Returns an error message if binding fails.
pub fn init_prometheus(listen: &str) -> Result<(), String> {
    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| format!("invalid metrics listen address: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install prometheus exporter: {}", e))?;

    Ok(())
}

// ============================================================================
// Metric Names
// ============================================================================

/// Total number of successful registrations.
pub const REGISTRATIONS_TOTAL: &str = "vpn_registrations_total";
/// Total number of successful authentications.
pub const AUTH_SUCCESS_TOTAL: &str = "vpn_auth_success_total";
/// Total number of failed authentications.
pub const AUTH_FAILURE_TOTAL: &str = "vpn_auth_failure_total";
/// Total number of sessions opened.
pub const SESSIONS_OPENED_TOTAL: &str = "vpn_sessions_opened_total";
/// Total number of sessions closed.
pub const SESSIONS_CLOSED_TOTAL: &str = "vpn_sessions_closed_total";
/// Number of currently connected users.
pub const SESSIONS_ACTIVE: &str = "vpn_sessions_active";
/// Session duration histogram (seconds).
pub const SESSION_DURATION_SECONDS: &str = "vpn_session_duration_seconds";
/// Total accounted traffic in bytes.
pub const ACCOUNTED_BYTES_TOTAL: &str = "vpn_accounted_bytes_total";
/// Total connect attempts rejected by entitlement (label: reason).
pub const CONNECTS_REJECTED_TOTAL: &str = "vpn_connects_rejected_total";
/// Total bindings provisioned (label: backend).
pub const BINDINGS_PROVISIONED_TOTAL: &str = "vpn_bindings_provisioned_total";
/// Total bindings revoked (label: backend).
pub const BINDINGS_REVOKED_TOTAL: &str = "vpn_bindings_revoked_total";
/// Total adapter call retries (label: backend).
pub const ADAPTER_RETRIES_TOTAL: &str = "vpn_adapter_retries_total";
/// Adapter call duration histogram (seconds, label: backend).
pub const ADAPTER_CALL_DURATION_SECONDS: &str = "vpn_adapter_call_duration_seconds";
/// Total settled payments.
pub const PAYMENTS_SETTLED_TOTAL: &str = "vpn_payments_settled_total";
/// Total number of errors by type.
pub const ERRORS_TOTAL: &str = "vpn_errors_total";

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a successful registration.
#[inline]
pub fn record_registration() {
    counter!(REGISTRATIONS_TOTAL).increment(1);
}

/// Record successful authentication.
#[inline]
pub fn record_auth_success() {
    counter!(AUTH_SUCCESS_TOTAL).increment(1);
}

/// Record failed authentication.
#[inline]
pub fn record_auth_failure() {
    counter!(AUTH_FAILURE_TOTAL).increment(1);
}

/// Record a session opened.
#[inline]
pub fn record_session_opened() {
    counter!(SESSIONS_OPENED_TOTAL).increment(1);
}

/// Record a session closed.
#[inline]
pub fn record_session_closed(duration_secs: f64) {
    counter!(SESSIONS_CLOSED_TOTAL).increment(1);
    histogram!(SESSION_DURATION_SECONDS).record(duration_secs);
}

/// Set the connected-users gauge.
#[inline]
#[allow(clippy::cast_precision_loss)]
pub fn set_sessions_active(count: usize) {
    gauge!(SESSIONS_ACTIVE).set(count as f64);
}

/// Record traffic accounted against user quotas.
#[inline]
pub fn record_accounted_bytes(bytes: u64) {
    counter!(ACCOUNTED_BYTES_TOTAL).increment(bytes);
}

/// Record a connect rejected by entitlement ("expired", "quota_exceeded").
#[inline]
pub fn record_connect_rejected(reason: &'static str) {
    counter!(CONNECTS_REJECTED_TOTAL, "reason" => reason).increment(1);
}

/// Record a binding made live.
#[inline]
pub fn record_binding_provisioned(backend: &'static str) {
    counter!(BINDINGS_PROVISIONED_TOTAL, "backend" => backend).increment(1);
}

/// Record a binding revoked.
#[inline]
pub fn record_binding_revoked(backend: &'static str) {
    counter!(BINDINGS_REVOKED_TOTAL, "backend" => backend).increment(1);
}

/// Record a retried adapter call.
#[inline]
pub fn record_adapter_retry(backend: &'static str) {
    counter!(ADAPTER_RETRIES_TOTAL, "backend" => backend).increment(1);
}

/// Record adapter call duration.
#[inline]
pub fn record_adapter_call_duration(backend: &'static str, duration_secs: f64) {
    histogram!(ADAPTER_CALL_DURATION_SECONDS, "backend" => backend).record(duration_secs);
}

/// Record a settled payment.
#[inline]
pub fn record_payment_settled() {
    counter!(PAYMENTS_SETTLED_TOTAL).increment(1);
}

/// Record an error by type.
#[inline]
pub fn record_error(error_type: &'static str) {
    counter!(ERRORS_TOTAL, "type" => error_type).increment(1);
}

// ============================================================================
// Error Type Constants (re-exported from vpn-core)
// ============================================================================

pub use vpn_core::{
    ERROR_ADAPTER, ERROR_AUTH, ERROR_CONFIG, ERROR_CONFLICT, ERROR_INVALID_INPUT,
    ERROR_NOT_ENTITLED, ERROR_NOT_FOUND, ERROR_STORAGE, ERROR_TIMEOUT,
};
