//! Prometheus metrics for order-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Counter for placed orders by result.
pub static ORDERS_PLACED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "order_placements_total",
        "Total number of checkout attempts",
        &["status"]
    )
    .expect("Failed to register ORDERS_PLACED")
});

/// Counter for payment intents created against the gateway.
pub static PAYMENT_INTENTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "order_payment_intents_total",
        "Total number of payment intents created",
        &["status"]
    )
    .expect("Failed to register PAYMENT_INTENTS")
});

/// Counter for reconciled gateway outcomes.
pub static PAYMENT_OUTCOMES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "order_payment_outcomes_total",
        "Total number of gateway outcomes applied",
        &["result", "transition"]
    )
    .expect("Failed to register PAYMENT_OUTCOMES")
});

/// Counter for notification requests handed to the sink.
pub static NOTIFICATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "order_notifications_total",
        "Total number of notification requests",
        &["kind", "status"]
    )
    .expect("Failed to register NOTIFICATIONS")
});

/// Histogram for storage operation duration.
pub static STORE_OP_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "order_store_op_duration_seconds",
        "Storage operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register STORE_OP_DURATION")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&ORDERS_PLACED);
    Lazy::force(&PAYMENT_INTENTS);
    Lazy::force(&PAYMENT_OUTCOMES);
    Lazy::force(&NOTIFICATIONS);
    Lazy::force(&STORE_OP_DURATION);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => String::from_utf8_lossy(&buffer).into_owned(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            String::new()
        }
    }
}

pub fn record_order_placed(status: &str) {
    ORDERS_PLACED.with_label_values(&[status]).inc();
}

pub fn record_payment_intent(status: &str) {
    PAYMENT_INTENTS.with_label_values(&[status]).inc();
}

pub fn record_payment_outcome(result: &str, transition: &str) {
    PAYMENT_OUTCOMES
        .with_label_values(&[result, transition])
        .inc();
}

pub fn record_notification(kind: &str, status: &str) {
    NOTIFICATIONS.with_label_values(&[kind, status]).inc();
}
