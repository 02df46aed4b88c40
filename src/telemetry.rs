//! Telemetry module for Gatehouse
//!
//! Prometheus metrics for login traffic.

use crate::{GatehouseError, Result};
use once_cell::sync::Lazy;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, TextEncoder, register_counter_vec,
    register_histogram_vec,
};

/// Outcome label for a successful login
pub const OUTCOME_SUCCESS: &str = "success";

/// Logins by provider and outcome
static LOGINS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "gatehouse_logins_total",
        "Total number of completed login callbacks",
        &["provider", "outcome"]
    )
    .unwrap()
});

/// Redirects to a provider's consent page
static LOGIN_REDIRECTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "gatehouse_login_redirects_total",
        "Total number of logins started",
        &["provider"]
    )
    .unwrap()
});

/// Account resolution duration histogram
static RESOLVE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        HistogramOpts::new(
            "gatehouse_resolve_duration_seconds",
            "Duration of account resolution in seconds"
        ),
        &["provider"]
    )
    .unwrap()
});

/// Record a finished login callback
///
/// `outcome` is [`OUTCOME_SUCCESS`] or the snake_case name of the failure.
pub fn record_login(provider: &str, outcome: &str) {
    LOGINS_TOTAL.with_label_values(&[provider, outcome]).inc();
}

/// Record a redirect to the provider
pub fn record_login_redirect(provider: &str) {
    LOGIN_REDIRECTS_TOTAL.with_label_values(&[provider]).inc();
}

/// Record how long account resolution took
pub fn record_resolve_duration(provider: &str, duration_secs: f64) {
    RESOLVE_DURATION
        .with_label_values(&[provider])
        .observe(duration_secs);
}

/// Get Prometheus metrics in text format
pub fn get_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| GatehouseError::config(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| GatehouseError::config(format!("Failed to convert metrics to UTF-8: {}", e)))
}
