use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::signals::Signals;
use super::state::Lifecycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Terminate,
    Interrupt,
}

impl ShutdownSignal {
    pub fn name(&self) -> &'static str {
        match self {
            ShutdownSignal::Terminate => "SIGTERM",
            ShutdownSignal::Interrupt => "SIGINT",
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
pub enum ShutdownError {
    #[error("failed to close listener: {0}")]
    ListenerClose(#[from] std::io::Error),
    #[error("shutdown task did not complete: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
    #[error("{0} ended without releasing cleanly")]
    Abandoned(&'static str),
}

impl ShutdownError {
    pub fn exit_reason(&self) -> ExitReason {
        match self {
            ShutdownError::ListenerClose(_) => ExitReason::ListenerClose,
            ShutdownError::TaskFailed(_) | ShutdownError::Abandoned(_) => {
                ExitReason::MainLoopDefect
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Clean,
    ShutdownTimeout,
    ListenerClose,
    MainLoopDefect,
    Startup,
}

/// How the process should terminate. Computing it has no side effects;
/// only [`ExitIntent::exit`] actually ends the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitIntent {
    pub code: i32,
    pub reason: ExitReason,
}

impl From<ExitReason> for ExitIntent {
    fn from(reason: ExitReason) -> Self {
        let code = match reason {
            ExitReason::Clean => 0,
            _ => 1,
        };
        Self { code, reason }
    }
}

impl ExitIntent {
    pub fn clean() -> Self {
        ExitReason::Clean.into()
    }

    pub fn is_clean(&self) -> bool {
        self.code == 0
    }

    pub fn exit(self) -> ! {
        std::process::exit(self.code)
    }
}

/// Runs the shutdown sequence once per process: the first signal starts it,
/// later signals are ignored.
pub struct ShutdownCoordinator {
    lifecycle: Lifecycle,
    grace_period: Duration,
}

impl ShutdownCoordinator {
    pub fn new(lifecycle: Lifecycle, grace_period: Duration) -> Self {
        Self {
            lifecycle,
            grace_period,
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Returns true if this call started shutdown. Readiness flips before the
    /// shutdown token is cancelled and listeners stop accepting.
    pub fn on_signal(&self, signal: ShutdownSignal) -> bool {
        if !self.lifecycle.claim_shutdown() {
            debug!(signal = signal.name(), "shutdown already in progress");
            return false;
        }
        warn!(
            signal = signal.name(),
            grace_period_ms = self.grace_period.as_millis() as u64,
            "shutdown_start"
        );
        self.lifecycle.stop_accepting();
        true
    }

    /// Forward OS signals to [`Self::on_signal`] until the signal streams close.
    pub async fn watch(&self, mut signals: Signals) {
        while let Some(signal) = signals.recv().await {
            self.on_signal(signal);
        }
    }

    /// Wait for `resources` to release, bounded by the grace period.
    pub async fn drain<F>(&self, resources: F) -> ExitIntent
    where
        F: Future<Output = Result<(), ShutdownError>>,
    {
        match tokio::time::timeout(self.grace_period, resources).await {
            Ok(Ok(())) => {
                self.lifecycle.mark_stopped();
                info!("shutdown_complete");
                ExitIntent::clean()
            }
            Ok(Err(err)) => {
                self.lifecycle.mark_stopped();
                error!(error = %err, "shutdown_error");
                err.exit_reason().into()
            }
            Err(_) => {
                error!(
                    grace_period_ms = self.grace_period.as_millis() as u64,
                    "shutdown_forced_timeout"
                );
                ExitReason::ShutdownTimeout.into()
            }
        }
    }
}
