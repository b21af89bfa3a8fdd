// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for the order subsystem
// ============================================================================
//
// Provides metrics for:
// - Orders created
// - Step transitions by stage and outcome
// - Facade operation latency and failures by error kind
// - Graph pool headroom
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub orders_created: IntCounter,
    pub order_transitions: IntCounterVec,
    pub operation_failures: IntCounterVec,
    pub operation_duration: HistogramVec,
    pub pool_available: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Total orders created")?;
        registry.register(Box::new(orders_created.clone()))?;

        let order_transitions = IntCounterVec::new(
            Opts::new("order_transitions_total", "Step transitions recorded"),
            &["stage", "outcome"],
        )?;
        registry.register(Box::new(order_transitions.clone()))?;

        let operation_failures = IntCounterVec::new(
            Opts::new("order_operation_failures_total", "Failed order operations"),
            &["operation", "kind"],
        )?;
        registry.register(Box::new(operation_failures.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new("order_operation_duration_seconds", "Order operation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let pool_available = IntGauge::new(
            "graph_pool_available_connections",
            "Graph connections free to acquire",
        )?;
        registry.register(Box::new(pool_available.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            order_transitions,
            operation_failures,
            operation_duration,
            pool_available,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_transition(&self, stage: &str, outcome: bool) {
        let outcome = if outcome { "pass" } else { "fail" };
        self.order_transitions.with_label_values(&[stage, outcome]).inc();
    }

    pub fn record_failure(&self, operation: &str, kind: &str) {
        self.operation_failures.with_label_values(&[operation, kind]).inc();
    }

    pub fn observe_duration(&self, operation: &str, seconds: f64) {
        self.operation_duration.with_label_values(&[operation]).observe(seconds);
    }
}
