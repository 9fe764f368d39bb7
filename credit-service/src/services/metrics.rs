//! Prometheus metrics for credit-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec, TextEncoder,
};

/// Ledger operation counter by operation and outcome.
pub static CREDIT_OPERATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "credit_operations_total",
        "Total number of credit ledger operations",
        &["operation", "status"] // consume/reserve/refund/recharge, ok/error - no user_id
    )
    .expect("Failed to register credit_operations_total")
});

/// Credits moved, by operation.
pub static CREDIT_AMOUNT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "credit_amount_total",
        "Total credits moved by ledger operations",
        &["operation"]
    )
    .expect("Failed to register credit_amount_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "credit_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register credit_errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "credit_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register credit_db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&CREDIT_OPERATIONS_TOTAL);
    Lazy::force(&CREDIT_AMOUNT_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Record a successful ledger operation and the credits it moved.
pub fn record_operation(operation: &str, amount: i64) {
    CREDIT_OPERATIONS_TOTAL
        .with_label_values(&[operation, "ok"])
        .inc();
    if amount > 0 {
        CREDIT_AMOUNT_TOTAL
            .with_label_values(&[operation])
            .inc_by(amount as u64);
    }
}

/// Record a failed ledger operation.
pub fn record_error(operation: &str, error_type: &str) {
    CREDIT_OPERATIONS_TOTAL
        .with_label_values(&[operation, "error"])
        .inc();
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
