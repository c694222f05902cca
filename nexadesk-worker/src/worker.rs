use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use nexadesk_common::lifecycle::ShutdownError;
use nexadesk_common::metrics::JobMetrics;

use crate::job::Job;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerError {
    #[error("worker loop was already started")]
    AlreadyStarted,
}

/// Runs one job per interval until cancelled. A job in flight always runs to
/// completion; cancellation is only observed between jobs.
pub struct Worker {
    job: Arc<dyn Job>,
    metrics: JobMetrics,
    interval: Duration,
    state: watch::Sender<WorkerState>,
}

impl Worker {
    pub fn new(job: impl Job + 'static, metrics: JobMetrics, interval: Duration) -> Self {
        let (state, _) = watch::channel(WorkerState::Idle);
        Self {
            job: Arc::new(job),
            metrics,
            interval,
            state,
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    pub async fn run(&self, token: CancellationToken) -> Result<(), WorkerError> {
        let started = self.state.send_if_modified(|state| match state {
            WorkerState::Idle => {
                *state = WorkerState::Running;
                true
            }
            _ => false,
        });
        if !started {
            return Err(WorkerError::AlreadyStarted);
        }

        info!(
            job = self.job.name(),
            interval_ms = self.interval.as_millis() as u64,
            "worker_started"
        );

        while !token.is_cancelled() {
            // Failures are recorded and logged by instrument, the loop carries on.
            let _ = self
                .metrics
                .instrument(self.job.name(), self.job.execute())
                .await;

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.state.send_replace(WorkerState::Stopping);
        self.state.send_replace(WorkerState::Stopped);
        info!("worker_stopped");
        Ok(())
    }
}

/// Resolve once the worker behind `state` reports Stopped.
pub async fn stopped(mut state: watch::Receiver<WorkerState>) -> Result<(), ShutdownError> {
    state
        .wait_for(|state| *state == WorkerState::Stopped)
        .await
        .map(|_| ())
        .map_err(|_| ShutdownError::Abandoned("worker loop"))
}
