use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Instrument};

use nexadesk_common::lifecycle::{
    ExitIntent, ExitReason, HealthReporter, Liveness, ShutdownCoordinator, ShutdownError,
};
use nexadesk_common::metrics::{self, JobMetrics, MetricsError, MetricsRegistry, RegistryBuilder};

use crate::config::Config;
use crate::job::Job;
use crate::worker::{self, Worker};

#[derive(Clone)]
pub struct MetricsState {
    pub registry: MetricsRegistry,
    pub health: HealthReporter,
}

/// Registry with the job metrics declared, plus the default process metrics.
pub fn build_registry() -> Result<MetricsRegistry, MetricsError> {
    let mut builder = RegistryBuilder::new(metrics::NAMESPACE);
    JobMetrics::declare(&mut builder)?;
    builder.build()
}

async fn render_metrics(State(state): State<MetricsState>) -> impl IntoResponse {
    metrics::render(&state.registry)
}

async fn healthz(State(state): State<MetricsState>) -> Liveness {
    state.health.liveness()
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not_found"})))
}

pub fn router(state: MetricsState) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .route("/healthz", get(healthz))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve<F>(listener: TcpListener, state: MetricsState, shutdown: F) -> Result<(), ShutdownError>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Run `job` on the configured interval and serve metrics on `listener`
/// until the coordinator begins shutdown, then drain both.
///
/// Either task finishing before shutdown was requested is a defect.
pub async fn run<J: Job + 'static>(
    config: &Config,
    listener: TcpListener,
    coordinator: Arc<ShutdownCoordinator>,
    job: J,
) -> ExitIntent {
    let lifecycle = coordinator.lifecycle().clone();

    let registry = match build_registry() {
        Ok(registry) => registry,
        Err(err) => {
            error!(error = %err, "failed to build metrics registry");
            return ExitReason::Startup.into();
        }
    };
    let job_metrics = match JobMetrics::new(&registry) {
        Ok(job_metrics) => job_metrics,
        Err(err) => {
            error!(error = %err, "failed to build metrics registry");
            return ExitReason::Startup.into();
        }
    };

    let state = MetricsState {
        registry,
        health: HealthReporter::new(lifecycle.clone()),
    };
    let mut server =
        tokio::spawn(serve(listener, state, lifecycle.shutdown_signal()).in_current_span());
    info!(port = config.metrics_port, address = %config.bind(), "metrics_server_started");

    let worker = Worker::new(job, job_metrics, config.job_interval.0);
    let worker_state = worker.subscribe();
    let token = lifecycle.token();
    let mut worker_loop = tokio::spawn({
        let token = token.clone();
        async move { worker.run(token).await }.in_current_span()
    });
    lifecycle.mark_running();

    let mut server_result = None;
    tokio::select! {
        biased;

        _ = token.cancelled() => {}
        result = &mut worker_loop => {
            if !lifecycle.is_shutting_down() {
                match result {
                    Ok(Ok(())) => error!(
                        error = "worker loop returned before shutdown was requested",
                        "worker_crash"
                    ),
                    Ok(Err(err)) => error!(error = %err, "worker_crash"),
                    Err(err) => error!(error = %err, "worker_crash"),
                }
                return ExitReason::MainLoopDefect.into();
            }
        }
        result = &mut server => {
            if !lifecycle.is_shutting_down() {
                match result {
                    Ok(Ok(())) => error!(
                        error = "metrics server stopped before shutdown was requested",
                        "unhandled_error"
                    ),
                    Ok(Err(err)) => error!(error = %err, "unhandled_error"),
                    Err(err) => error!(error = %err, "unhandled_error"),
                }
                return ExitReason::MainLoopDefect.into();
            }
            server_result = Some(result);
        }
    }

    let listener_closed = async move {
        // A JoinHandle must not be polled again once it has completed.
        let result = match server_result {
            Some(result) => result,
            None => server.await,
        };
        match result? {
            Ok(()) => {
                info!("metrics_shutdown_complete");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "metrics_shutdown_error");
                Err(err)
            }
        }
    };

    coordinator
        .drain(async move {
            let (listener, loop_stopped) =
                tokio::join!(listener_closed, worker::stopped(worker_state));
            listener.and(loop_stopped)
        })
        .await
}
