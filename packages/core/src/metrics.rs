//! Prometheus metrics registry.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and hand it to
//! the subscription service, the update scheduler and the HTTP middleware.
//!
//! Exposed at `GET /metrics` in Prometheus text exposition format
//! (`text/plain; version=0.0.4`).

use prometheus::{
    Counter, CounterVec, Histogram, HistogramOpts, Opts, Registry,
};

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// All application-level Prometheus metrics.
pub struct AppMetrics {
    /// Subscriptions created (pending).
    pub subscriptions_created_total: Counter,
    /// Subscriptions confirmed.
    pub subscriptions_confirmed_total: Counter,
    /// Subscriptions deleted via unsubscribe.
    pub subscriptions_deleted_total: Counter,
    /// Confirmation emails that failed after the record was stored.
    pub confirmation_email_failures_total: Counter,
    /// Scheduler cycles started, by frequency.
    pub update_cycles_total: CounterVec,
    /// Scheduler cycles aborted because the subscriber list could not be loaded.
    pub update_cycle_errors_total: CounterVec,
    /// Weather update emails delivered, by frequency.
    pub updates_sent_total: CounterVec,
    /// Subscribers skipped because of a lookup, send or timeout failure.
    pub update_failures_total: CounterVec,
    /// HTTP request count, labelled by method, path, and status code.
    pub http_requests_total: CounterVec,
    /// HTTP request latency histogram in seconds.
    pub http_request_duration: Histogram,
    /// The registry that owns all of the above metrics.
    pub registry: Registry,
}

impl AppMetrics {
    /// Create and register all metrics. Returns an error if any metric
    /// name is invalid or duplicated.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let subscriptions_created_total = Counter::with_opts(Opts::new(
            "weather_subscriptions_created_total",
            "Subscriptions created",
        ))?;

        let subscriptions_confirmed_total = Counter::with_opts(Opts::new(
            "weather_subscriptions_confirmed_total",
            "Subscriptions confirmed",
        ))?;

        let subscriptions_deleted_total = Counter::with_opts(Opts::new(
            "weather_subscriptions_deleted_total",
            "Subscriptions removed by unsubscribe",
        ))?;

        let confirmation_email_failures_total = Counter::with_opts(Opts::new(
            "weather_subscriptions_confirmation_email_failures_total",
            "Confirmation emails that could not be sent",
        ))?;

        let update_cycles_total = CounterVec::new(
            Opts::new(
                "weather_subscriptions_update_cycles_total",
                "Scheduler cycles started, by frequency",
            ),
            &["frequency"],
        )?;

        let update_cycle_errors_total = CounterVec::new(
            Opts::new(
                "weather_subscriptions_update_cycle_errors_total",
                "Scheduler cycles aborted on store failure, by frequency",
            ),
            &["frequency"],
        )?;

        let updates_sent_total = CounterVec::new(
            Opts::new(
                "weather_subscriptions_updates_sent_total",
                "Weather update emails delivered, by frequency",
            ),
            &["frequency"],
        )?;

        let update_failures_total = CounterVec::new(
            Opts::new(
                "weather_subscriptions_update_failures_total",
                "Subscribers skipped during a cycle, by frequency and stage",
            ),
            &["frequency", "stage"],
        )?;

        let http_requests_total = CounterVec::new(
            Opts::new(
                "weather_subscriptions_http_requests_total",
                "HTTP requests by method, path, and status",
            ),
            &["method", "path", "status"],
        )?;

        let http_request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "weather_subscriptions_http_request_duration_seconds",
                "HTTP request latency in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;

        registry.register(Box::new(subscriptions_created_total.clone()))?;
        registry.register(Box::new(subscriptions_confirmed_total.clone()))?;
        registry.register(Box::new(subscriptions_deleted_total.clone()))?;
        registry.register(Box::new(confirmation_email_failures_total.clone()))?;
        registry.register(Box::new(update_cycles_total.clone()))?;
        registry.register(Box::new(update_cycle_errors_total.clone()))?;
        registry.register(Box::new(updates_sent_total.clone()))?;
        registry.register(Box::new(update_failures_total.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;

        Ok(Self {
            subscriptions_created_total,
            subscriptions_confirmed_total,
            subscriptions_deleted_total,
            confirmation_email_failures_total,
            update_cycles_total,
            update_cycle_errors_total,
            updates_sent_total,
            update_failures_total,
            http_requests_total,
            http_request_duration,
            registry,
        })
    }

    /// Render all metrics as Prometheus text format (for the `/metrics` endpoint).
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}
