use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub adapter_calls_total: IntCounterVec,
    pub adapter_latency_seconds: HistogramVec,
    pub notifications_total: IntCounterVec,
    pub hook_failures_total: IntCounterVec,
    pub cold_chain_breaches_total: IntCounter,
    pub ws_connections: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Ledger transition attempts by operation and outcome"),
            &["operation", "outcome"],
        )
        .expect("valid transitions_total metric");

        let adapter_calls_total = IntCounterVec::new(
            Opts::new("adapter_calls_total", "External adapter calls by adapter and outcome"),
            &["adapter", "outcome"],
        )
        .expect("valid adapter_calls_total metric");

        let adapter_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "adapter_latency_seconds",
                "Latency of external adapter calls in seconds",
            ),
            &["adapter"],
        )
        .expect("valid adapter_latency_seconds metric");

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Fan-out notifications by outcome"),
            &["outcome"],
        )
        .expect("valid notifications_total metric");

        let hook_failures_total = IntCounterVec::new(
            Opts::new("hook_failures_total", "Failed post-commit hooks by hook"),
            &["hook"],
        )
        .expect("valid hook_failures_total metric");

        let cold_chain_breaches_total = IntCounter::new(
            "cold_chain_breaches_total",
            "Temperature readings above the cold-chain threshold",
        )
        .expect("valid cold_chain_breaches_total metric");

        let ws_connections = IntGauge::new("ws_connections", "Open websocket connections")
            .expect("valid ws_connections metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(adapter_calls_total.clone()))
            .expect("register adapter_calls_total");
        registry
            .register(Box::new(adapter_latency_seconds.clone()))
            .expect("register adapter_latency_seconds");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(hook_failures_total.clone()))
            .expect("register hook_failures_total");
        registry
            .register(Box::new(cold_chain_breaches_total.clone()))
            .expect("register cold_chain_breaches_total");
        registry
            .register(Box::new(ws_connections.clone()))
            .expect("register ws_connections");

        Self {
            registry,
            transitions_total,
            adapter_calls_total,
            adapter_latency_seconds,
            notifications_total,
            hook_failures_total,
            cold_chain_breaches_total,
            ws_connections,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
