use std::sync::Arc;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

/// Prometheus metrics for the gateway. Constructed once per process and
/// injected through `AppState` so tests can build isolated instances.
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Token lifecycle
    pub token_refreshes: IntCounter,
    pub token_refresh_failures: IntCounter,

    // Upstream calls
    pub upstream_requests: IntCounterVec,
    pub upstream_retries: IntCounterVec,
    pub upstream_failures: IntCounterVec,
    pub upstream_duration: HistogramVec,

    pub up: IntGauge,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("foodgateway".into()), None).unwrap();

        let metrics = Arc::new(Self {
            token_refreshes: IntCounter::new(
                "token_refreshes_total",
                "Successful client-credentials token refreshes",
            )
            .unwrap(),
            token_refresh_failures: IntCounter::new(
                "token_refresh_failures_total",
                "Token refresh attempts that failed",
            )
            .unwrap(),

            upstream_requests: IntCounterVec::new(
                Opts::new("upstream_requests_total", "Proxied upstream requests"),
                &["endpoint"],
            )
            .unwrap(),
            upstream_retries: IntCounterVec::new(
                Opts::new("upstream_retries_total", "Retried upstream attempts by reason"),
                &["endpoint", "reason"],
            )
            .unwrap(),
            upstream_failures: IntCounterVec::new(
                Opts::new("upstream_failures_total", "Upstream calls that exhausted retries"),
                &["endpoint", "reason"],
            )
            .unwrap(),
            upstream_duration: HistogramVec::new(
                HistogramOpts::new("upstream_duration_seconds", "Upstream call duration seconds")
                    .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
                &["endpoint"],
            )
            .unwrap(),

            up: IntGauge::new("up", "1 if service is healthy").unwrap(),
            registry,
        });

        let reg = &metrics.registry;
        reg.register(Box::new(metrics.token_refreshes.clone())).unwrap();
        reg.register(Box::new(metrics.token_refresh_failures.clone())).unwrap();
        reg.register(Box::new(metrics.upstream_requests.clone())).unwrap();
        reg.register(Box::new(metrics.upstream_retries.clone())).unwrap();
        reg.register(Box::new(metrics.upstream_failures.clone())).unwrap();
        reg.register(Box::new(metrics.upstream_duration.clone())).unwrap();
        reg.register(Box::new(metrics.up.clone())).unwrap();

        metrics
    }
}
