use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    Counter, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

/// A container for all Prometheus metric collectors of the task allocator.
///
/// This struct is designed to be wrapped in an `Arc` and shared between the
/// auctioneer, the allocation loop and the metrics endpoint.
pub struct Metrics {
    pub registry: Registry,
    /// Finished auction rounds, labelled by outcome.
    pub rounds_total: IntCounterVec,
    /// Usable offers received from agents.
    pub bids_received_total: IntCounter,
    /// Replies that did not count, labelled by round stage and fault kind.
    pub response_faults_total: IntCounterVec,
    pub tasks_completed_total: IntCounter,
    pub tasks_failed_total: IntCounter,
    /// Sum of all rewards credited to session balances.
    pub rewards_paid_total: Counter,
    /// Number of currently registered agent sessions.
    pub sessions_active: IntGauge,
    /// Wall time of a round from announcement to close.
    pub round_duration_seconds: Histogram,
}

impl Metrics {
    /// Creates a new `Metrics` struct, initializing and registering all collectors.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("task_allocator".into()), None)?;

        // A helper macro to create, register, and return a metric collector.
        macro_rules! reg {
            ($metric:expr) => {{
                let collector = $metric;
                registry.register(Box::new(collector.clone()))?;
                collector
            }};
        }

        Ok(Self {
            rounds_total: reg!(IntCounterVec::new(
                Opts::new("rounds_total", "Auction rounds run, by outcome"),
                &["outcome"]
            )?),
            bids_received_total: reg!(IntCounter::new(
                "bids_received_total",
                "Usable bids received from agents"
            )?),
            response_faults_total: reg!(IntCounterVec::new(
                Opts::new(
                    "response_faults_total",
                    "Agent replies that were declined, late, stale or malformed"
                ),
                &["stage", "kind"]
            )?),
            tasks_completed_total: reg!(IntCounter::new(
                "tasks_completed_total",
                "Tasks completed by their winning agent"
            )?),
            tasks_failed_total: reg!(IntCounter::new(
                "tasks_failed_total",
                "Awarded tasks that ended in failure or timed out"
            )?),
            rewards_paid_total: reg!(Counter::new(
                "rewards_paid_total",
                "Total reward credited to agent sessions"
            )?),
            sessions_active: reg!(IntGauge::new(
                "sessions_active",
                "Number of registered agent sessions"
            )?),
            round_duration_seconds: reg!(Histogram::with_opts(
                HistogramOpts::new("round_duration_seconds", "Duration of one auction round")
                    .buckets(prometheus::exponential_buckets(0.01, 2.0, 14)?)
            )?),
            registry,
        })
    }

    /// Creates an `axum::Router` that serves the metrics on the `/metrics` endpoint.
    pub fn router(&self) -> Router {
        let registry = self.registry.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let registry = registry.clone();
                async move {
                    let metric_families = registry.gather();
                    let mut buffer = Vec::new();
                    if let Err(e) = TextEncoder::new().encode(&metric_families, &mut buffer) {
                        tracing::error!(error = %e, "Failed to encode metrics");
                        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                    }
                    match String::from_utf8(buffer) {
                        Ok(body) => body.into_response(),
                        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                    }
                }
            }),
        )
    }

    pub fn record_round(&self, outcome: &str) {
        self.rounds_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_fault(&self, stage: &str, kind: &str) {
        self.response_faults_total
            .with_label_values(&[stage, kind])
            .inc();
    }

    /// Sets the value of the active sessions gauge.
    pub fn update_active_sessions(&self, count: usize) {
        self.sessions_active.set(count as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collectors_are_registered_with_prefix() {
        let metrics = Metrics::new().unwrap();
        metrics.record_round("completed");
        metrics.record_fault("bid", "timeout");
        metrics.update_active_sessions(2);

        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|mf| mf.get_name().to_owned())
            .collect();
        assert!(names.contains(&"task_allocator_rounds_total".to_owned()));
        assert!(names.contains(&"task_allocator_response_faults_total".to_owned()));
        assert_eq!(metrics.sessions_active.get(), 2);
        assert_eq!(metrics.rounds_total.with_label_values(&["completed"]).get(), 1);
    }
}
