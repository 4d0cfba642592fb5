use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static CHECKOUT_INTENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static WEBHOOK_EVENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static ORDER_STATUS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Install the Prometheus recorder and custom counters. Idempotent so
/// that multiple applications in one process (tests) share one recorder.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }

    let builder = PrometheusBuilder::new();
    let Ok(handle) = builder.install_recorder() else {
        return;
    };
    if METRICS_HANDLE.set(handle).is_err() {
        return;
    }

    let registry = Registry::new();

    let intents_counter = IntCounterVec::new(
        Opts::new(
            "checkout_intents_total",
            "Payment intents by currency and action",
        ),
        &["currency", "action"],
    )
    .expect("Failed to create checkout_intents_total metric");

    let webhook_counter = IntCounterVec::new(
        Opts::new(
            "checkout_webhook_events_total",
            "Provider webhook events by type and outcome",
        ),
        &["event", "outcome"],
    )
    .expect("Failed to create checkout_webhook_events_total metric");

    let status_counter = IntCounterVec::new(
        Opts::new(
            "checkout_order_status_total",
            "Order status transitions by target status",
        ),
        &["status"],
    )
    .expect("Failed to create checkout_order_status_total metric");

    registry
        .register(Box::new(intents_counter.clone()))
        .expect("Failed to register checkout_intents_total");
    registry
        .register(Box::new(webhook_counter.clone()))
        .expect("Failed to register checkout_webhook_events_total");
    registry
        .register(Box::new(status_counter.clone()))
        .expect("Failed to register checkout_order_status_total");

    PROMETHEUS_REGISTRY
        .set(registry)
        .expect("Failed to set prometheus registry");
    CHECKOUT_INTENTS_TOTAL
        .set(intents_counter)
        .expect("Failed to set checkout_intents_total");
    WEBHOOK_EVENTS_TOTAL
        .set(webhook_counter)
        .expect("Failed to set checkout_webhook_events_total");
    ORDER_STATUS_TOTAL
        .set(status_counter)
        .expect("Failed to set checkout_order_status_total");
}

pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

/// Record a payment intent operation (created, updated, replaced).
pub fn record_intent(currency: &str, action: &str) {
    if let Some(counter) = CHECKOUT_INTENTS_TOTAL.get() {
        counter.with_label_values(&[currency, action]).inc();
    }
}

/// Record a webhook event and how it was reconciled.
pub fn record_webhook(event: &str, outcome: &str) {
    if let Some(counter) = WEBHOOK_EVENTS_TOTAL.get() {
        counter.with_label_values(&[event, outcome]).inc();
    }
}

/// Record an applied order status transition.
pub fn record_order_status(status: &str) {
    if let Some(counter) = ORDER_STATUS_TOTAL.get() {
        counter.with_label_values(&[status]).inc();
    }
}
