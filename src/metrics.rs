// Prometheus metrics for the webhook relay
//
// Exposed on the /metrics endpoint of the API server:
// - Events dispatched (counter)
// - Delivery attempts by outcome (counter)
// - Delivery chains by terminal outcome (counter)
// - Registered subscriptions (gauge)

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref EVENTS_DISPATCHED_TOTAL: IntCounter = IntCounter::new(
        "webhook_events_dispatched_total",
        "Total number of events accepted for dispatch"
    ).expect("Failed to create events dispatched metric");

    pub static ref DELIVERY_ATTEMPTS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("webhook_delivery_attempts_total", "Total number of delivery attempts"),
        &["status"]
    ).expect("Failed to create delivery attempts metric");

    pub static ref DELIVERY_CHAINS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("webhook_delivery_chains_total", "Delivery chains by terminal outcome"),
        &["outcome"]
    ).expect("Failed to create delivery chains metric");

    pub static ref REGISTERED_SUBSCRIPTIONS: IntGauge = IntGauge::new(
        "webhook_registered_subscriptions",
        "Number of currently registered subscriptions"
    ).expect("Failed to create registered subscriptions metric");
}

/// Register all collectors with the process registry
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() -> prometheus::Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(EVENTS_DISPATCHED_TOTAL.clone()),
        Box::new(DELIVERY_ATTEMPTS_TOTAL.clone()),
        Box::new(DELIVERY_CHAINS_TOTAL.clone()),
        Box::new(REGISTERED_SUBSCRIPTIONS.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
