//! Metrics registry and instrumentation.
//!
//! Every process builds one [`MetricsRegistry`] at startup and hands clones of
//! it to the components that record samples; nothing goes through the global
//! `metrics` recorder.

mod instrument;
mod process;
mod registry;

pub use instrument::{
    duration_ms, timed, track_metrics, HttpMetrics, JobMetrics, Outcome, Timed,
    HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION, JOBS_PROCESSED_TOTAL, JOB_DURATION,
    UNMATCHED_ROUTE,
};
pub use registry::{
    Metric, MetricKind, MetricSpec, MetricsError, MetricsRegistry, RegistryBuilder, CONTENT_TYPE,
};

/// Prefix shared by every nexadesk metric.
pub const NAMESPACE: &str = "nexadesk_";

/// Route handler body for `/metrics`: the exposition text with its content type.
pub fn render(registry: &MetricsRegistry) -> impl axum::response::IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, CONTENT_TYPE)],
        registry.snapshot(),
    )
}
