use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder once per process; later calls
    /// return a handle to the same recorder.
    pub fn init() -> anyhow::Result<Self> {
        static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

        let handle = HANDLE.get_or_try_init(|| {
            let handle = PrometheusBuilder::new().install_recorder()?;
            describe();
            Ok::<_, anyhow::Error>(handle)
        })?;

        Ok(Self {
            handle: handle.clone(),
        })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// Register descriptions so series show up on /metrics.
fn describe() {
    describe_counter!(
        "aggregation_requests_total",
        "Aggregation calls dispatched to the sources."
    );
    describe_counter!(
        "aggregation_failures_total",
        "Aggregation calls that failed, by reason."
    );
    describe_counter!(
        "source_errors_total",
        "Upstream source failures, by source."
    );
    describe_counter!(
        "snapshots_written_total",
        "Snapshots appended to the store."
    );
    describe_counter!(
        "rate_limit_rejections_total",
        "Requests rejected by the per-client rate limiter."
    );
    describe_histogram!(
        "aggregation_duration_ms",
        "Wall time of one aggregation call in milliseconds."
    );
}
