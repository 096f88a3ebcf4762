//! Prometheus metrics for the dispatch engine.
//!
//! Counters cover the admission path (submitted, quota denials) and the
//! reconciliation path (delivered, failed by channel).

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec, TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "courier";

lazy_static! {
    /// Total delivery requests admitted and persisted as pending
    pub static ref SUBMITTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_submitted_total", METRIC_PREFIX),
        "Total delivery requests admitted and persisted as pending"
    ).unwrap();

    /// Total requests denied at admission by quota
    pub static ref QUOTA_DENIED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_quota_denied_total", METRIC_PREFIX),
        "Total delivery requests denied by quota limits"
    ).unwrap();

    /// Total deliveries reconciled as sent, by channel
    pub static ref DELIVERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_delivered_total", METRIC_PREFIX),
        "Total deliveries reconciled as sent",
        &["channel"]
    ).unwrap();

    /// Total deliveries reconciled as failed, by channel
    pub static ref FAILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_failed_total", METRIC_PREFIX),
        "Total deliveries reconciled as failed",
        &["channel"]
    ).unwrap();

    /// Reconciliation writes that could not be persisted
    pub static ref RECONCILE_WRITE_ERRORS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_reconcile_write_errors_total", METRIC_PREFIX),
        "Reconciliation outcomes that failed to persist"
    ).unwrap();
}

/// Encode all registered metrics in the Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    encoder.encode_to_string(&families).unwrap_or_default()
}
