use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{info, warn};

use super::registry::{Metric, MetricSpec, MetricsError, MetricsRegistry, RegistryBuilder};

pub const HTTP_REQUESTS_TOTAL: &str = "nexadesk_http_requests_total";
pub const HTTP_REQUEST_DURATION: &str = "nexadesk_http_request_duration_seconds";
pub const JOBS_PROCESSED_TOTAL: &str = "nexadesk_worker_jobs_processed_total";
pub const JOB_DURATION: &str = "nexadesk_worker_job_duration_seconds";

/// Route label used for requests no route matched, keeps the label set bounded.
pub const UNMATCHED_ROUTE: &str = "unmatched";

const HTTP_LABELS: &[&str] = &["method", "route", "status_code"];
const HTTP_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0];
const JOB_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error,
}

impl Outcome {
    pub fn as_label(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Error => "error",
        }
    }
}

pub struct Timed<T> {
    pub output: T,
    pub elapsed: Duration,
}

/// Run `future` to completion and measure it with a monotonic clock.
pub async fn timed<F: Future>(future: F) -> Timed<F::Output> {
    let start = Instant::now();
    let output = future.await;
    Timed {
        output,
        elapsed: start.elapsed(),
    }
}

pub fn duration_ms(elapsed: Duration) -> u64 {
    (elapsed.as_secs_f64() * 1000.0).round() as u64
}

fn lookup(registry: &MetricsRegistry, name: &str) -> Result<Metric, MetricsError> {
    registry
        .metric(name)
        .ok_or_else(|| MetricsError::Unknown(name.to_owned()))
}

/// Request counter and latency histogram, labelled by method, route and status code.
#[derive(Clone)]
pub struct HttpMetrics {
    registry: MetricsRegistry,
    requests: Metric,
    duration: Metric,
}

impl HttpMetrics {
    pub fn declare(builder: &mut RegistryBuilder) -> Result<(), MetricsError> {
        builder.register(
            MetricSpec::counter(HTTP_REQUESTS_TOTAL, "Total HTTP requests").with_labels(HTTP_LABELS),
        )?;
        builder.register(
            MetricSpec::histogram(
                HTTP_REQUEST_DURATION,
                "HTTP request duration in seconds",
                HTTP_BUCKETS,
            )
            .with_labels(HTTP_LABELS),
        )?;
        Ok(())
    }

    pub fn new(registry: &MetricsRegistry) -> Result<Self, MetricsError> {
        Ok(Self {
            registry: registry.clone(),
            requests: lookup(registry, HTTP_REQUESTS_TOTAL)?,
            duration: lookup(registry, HTTP_REQUEST_DURATION)?,
        })
    }

    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    pub fn record(&self, method: &str, route: &str, status: u16, elapsed: Duration) {
        let status = status.to_string();
        let labels = [method, route, status.as_str()];
        let result = self
            .registry
            .observe(&self.duration, &labels, elapsed.as_secs_f64())
            .and_then(|_| self.registry.inc(&self.requests, &labels));
        if let Err(error) = result {
            tracing::error!(%error, "failed to record request metrics");
        }
    }
}

/// Middleware to record request metrics and log one line per request.
/// The response is passed through untouched, error statuses included.
pub async fn track_metrics(State(metrics): State<HttpMetrics>, req: Request, next: Next) -> Response {
    let route = match req.extensions().get::<MatchedPath>() {
        Some(matched_path) => matched_path.as_str().to_owned(),
        None => UNMATCHED_ROUTE.to_owned(),
    };
    let method = req.method().clone();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());

    let Timed {
        output: response,
        elapsed,
    } = timed(next.run(req)).await;
    let status = response.status().as_u16();

    metrics.record(method.as_str(), &route, status, elapsed);
    info!(
        method = %method,
        path = %path,
        status_code = status,
        duration_ms = duration_ms(elapsed),
        "request"
    );

    response
}

/// Processed-jobs counter (by result) and job duration histogram.
#[derive(Clone)]
pub struct JobMetrics {
    registry: MetricsRegistry,
    processed: Metric,
    duration: Metric,
}

impl JobMetrics {
    pub fn declare(builder: &mut RegistryBuilder) -> Result<(), MetricsError> {
        builder.register(
            MetricSpec::counter(
                JOBS_PROCESSED_TOTAL,
                "Total number of jobs processed by the worker",
            )
            .with_labels(&["result"]),
        )?;
        builder.register(MetricSpec::histogram(
            JOB_DURATION,
            "Duration of worker jobs in seconds",
            JOB_BUCKETS,
        ))?;
        Ok(())
    }

    pub fn new(registry: &MetricsRegistry) -> Result<Self, MetricsError> {
        Ok(Self {
            registry: registry.clone(),
            processed: lookup(registry, JOBS_PROCESSED_TOTAL)?,
            duration: lookup(registry, JOB_DURATION)?,
        })
    }

    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    /// Time `future`, record its duration and outcome, log `job_processed`,
    /// then hand the result back. Errors are surfaced, never swallowed here.
    pub async fn instrument<F, T, E>(&self, job: &str, future: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let Timed { output, elapsed } = timed(future).await;
        let outcome = match output {
            Ok(_) => Outcome::Success,
            Err(_) => Outcome::Error,
        };

        self.record(outcome, elapsed);
        match &output {
            Ok(_) => info!(
                job,
                result = outcome.as_label(),
                duration_ms = duration_ms(elapsed),
                "job_processed"
            ),
            Err(err) => warn!(
                job,
                result = outcome.as_label(),
                err = %err,
                duration_ms = duration_ms(elapsed),
                "job_processed"
            ),
        }
        output
    }

    fn record(&self, outcome: Outcome, elapsed: Duration) {
        let result = self
            .registry
            .observe(&self.duration, &[], elapsed.as_secs_f64())
            .and_then(|_| self.registry.inc(&self.processed, &[outcome.as_label()]));
        if let Err(error) = result {
            tracing::error!(%error, "failed to record job metrics");
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    use super::*;

    fn job_metrics() -> JobMetrics {
        let mut builder = RegistryBuilder::new("nexadesk_");
        JobMetrics::declare(&mut builder).unwrap();
        JobMetrics::new(&builder.build().unwrap()).unwrap()
    }

    fn http_metrics() -> HttpMetrics {
        let mut builder = RegistryBuilder::new("nexadesk_");
        HttpMetrics::declare(&mut builder).unwrap();
        HttpMetrics::new(&builder.build().unwrap()).unwrap()
    }

    #[test]
    fn rounds_to_milliseconds() {
        assert_eq!(duration_ms(Duration::from_micros(1_499)), 1);
        assert_eq!(duration_ms(Duration::from_micros(1_500)), 2);
        assert_eq!(duration_ms(Duration::ZERO), 0);
    }

    #[test]
    fn missing_declarations_are_reported() {
        let registry = RegistryBuilder::new("nexadesk_").build().unwrap();
        assert!(matches!(
            JobMetrics::new(&registry),
            Err(MetricsError::Unknown(name)) if name == JOBS_PROCESSED_TOTAL
        ));
    }

    #[tokio::test]
    async fn instrument_records_success_and_error() {
        let metrics = job_metrics();

        let ok: Result<u8, String> = metrics.instrument("synthetic", async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));
        let err: Result<u8, String> = metrics
            .instrument("synthetic", async { Err("boom".to_owned()) })
            .await;
        assert_eq!(err, Err("boom".to_owned()));

        let text = metrics.registry().snapshot();
        assert!(text.contains("nexadesk_worker_jobs_processed_total{result=\"success\"} 1"));
        assert!(text.contains("nexadesk_worker_jobs_processed_total{result=\"error\"} 1"));
        assert!(text.contains("nexadesk_worker_job_duration_seconds_count 2"));
    }

    #[tokio::test]
    async fn track_metrics_labels_matched_and_unmatched_routes() {
        let metrics = http_metrics();
        let app = Router::new()
            .route("/items/:id", get(|| async { "item" }))
            .layer(axum::middleware::from_fn_with_state(
                metrics.clone(),
                track_metrics,
            ));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/items/42").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let text = metrics.registry().snapshot();
        assert!(text.contains(
            "nexadesk_http_requests_total{method=\"GET\",route=\"/items/:id\",status_code=\"200\"} 1"
        ));
        assert!(text.contains(
            "nexadesk_http_requests_total{method=\"GET\",route=\"unmatched\",status_code=\"404\"} 1"
        ));
    }
}
