use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, Instrument};

use nexadesk_common::lifecycle::{
    ExitIntent, ExitReason, HealthReporter, Lifecycle, ShutdownCoordinator, ShutdownError,
};
use nexadesk_common::metrics::{HttpMetrics, MetricsError, RegistryBuilder, NAMESPACE};

use crate::api::VersionResponse;
use crate::config::Config;
use crate::router::{self, AppState};
use crate::time::{SystemTime, TimeSource};

/// Build the registry and the shared handler state for one process.
pub fn app_state<T>(config: &Config, lifecycle: &Lifecycle, timesource: T) -> Result<AppState, MetricsError>
where
    T: TimeSource + Send + Sync + 'static,
{
    let mut builder = RegistryBuilder::new(NAMESPACE);
    HttpMetrics::declare(&mut builder)?;
    let registry = builder.build()?;

    Ok(AppState {
        version: Arc::new(VersionResponse {
            service: config.service_name(),
            version: config.service.version.clone(),
            git_sha: config.service.git_sha.clone(),
            env: config.service.env.clone(),
        }),
        health: HealthReporter::new(lifecycle.clone()),
        metrics: HttpMetrics::new(&registry)?,
        timesource: Arc::new(timesource),
    })
}

/// Serve until `shutdown` resolves, then wait for in-flight requests to finish.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), ShutdownError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router::router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Serve on `listener` until the coordinator begins shutdown, then drain.
///
/// Signal handling stays with the caller: whoever owns `coordinator` calls
/// `on_signal`. The server stopping on its own before that is a defect.
pub async fn run(
    config: &Config,
    listener: TcpListener,
    coordinator: Arc<ShutdownCoordinator>,
) -> ExitIntent {
    let lifecycle = coordinator.lifecycle().clone();

    let state = match app_state(config, &lifecycle, SystemTime {}) {
        Ok(state) => state,
        Err(err) => {
            error!(error = %err, "failed to build metrics registry");
            return ExitReason::Startup.into();
        }
    };

    let mut server =
        tokio::spawn(serve(listener, state, lifecycle.shutdown_signal()).in_current_span());
    lifecycle.mark_running();
    info!(port = config.port, address = %config.bind(), "server_started");

    let token = lifecycle.token();
    let finished_early = tokio::select! {
        biased;

        _ = token.cancelled() => None,
        result = &mut server => Some(result),
    };

    if !lifecycle.is_shutting_down() {
        if let Some(result) = finished_early {
            match result {
                Ok(Ok(())) => error!(
                    error = "server stopped before shutdown was requested",
                    "unhandled_error"
                ),
                Ok(Err(err)) => error!(error = %err, "unhandled_error"),
                Err(err) => error!(error = %err, "unhandled_error"),
            }
            return ExitReason::MainLoopDefect.into();
        }
    }

    coordinator
        .drain(async move {
            // A JoinHandle must not be polled again once it has completed.
            let result = match finished_early {
                Some(result) => result,
                None => server.await,
            };
            result?
        })
        .await
}
