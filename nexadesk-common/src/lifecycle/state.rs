use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    /// Listeners are not bound yet.
    Starting = 0,
    Running = 1,
    ShuttingDown = 2,
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Starting,
            1 => LifecycleState::Running,
            2 => LifecycleState::ShuttingDown,
            _ => LifecycleState::Stopped,
        }
    }
}

struct Inner {
    state: AtomicU8,
    shutdown_token: CancellationToken,
}

/// Shared lifecycle state of a process. Transitions only ever move forward.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<Inner>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(LifecycleState::Starting as u8),
                shutdown_token: CancellationToken::new(),
            }),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// Startup is complete (registry built, listener bound). No-op once shutdown began.
    pub fn mark_running(&self) -> bool {
        self.advance(LifecycleState::Running)
    }

    /// Move to ShuttingDown and cancel the shutdown token. Returns false if
    /// shutdown had already begun. The state is stored before the token fires,
    /// so readiness is false by the time listeners start closing. Runtime code
    /// goes through `ShutdownCoordinator::on_signal` instead.
    #[cfg(test)]
    pub(crate) fn begin_shutdown(&self) -> bool {
        if !self.claim_shutdown() {
            return false;
        }
        self.stop_accepting();
        true
    }

    pub(crate) fn mark_stopped(&self) {
        self.advance(LifecycleState::Stopped);
        self.stop_accepting();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state() >= LifecycleState::ShuttingDown
    }

    /// Token cancelled when shutdown begins, for `tokio::select!` in work loops.
    pub fn token(&self) -> CancellationToken {
        self.inner.shutdown_token.clone()
    }

    /// Future that resolves when shutdown begins; pass to `axum::serve(..).with_graceful_shutdown`.
    pub fn shutdown_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let token = self.inner.shutdown_token.clone();
        async move {
            token.cancelled().await;
        }
    }

    pub(crate) fn claim_shutdown(&self) -> bool {
        self.advance(LifecycleState::ShuttingDown)
    }

    pub(crate) fn stop_accepting(&self) {
        self.inner.shutdown_token.cancel();
    }

    fn advance(&self, to: LifecycleState) -> bool {
        self.inner
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < to as u8).then_some(to as u8)
            })
            .is_ok()
    }
}
