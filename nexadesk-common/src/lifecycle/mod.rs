//! Process lifecycle: forward-only state, liveness/readiness probes, and the
//! signal-driven graceful shutdown sequence.
//!
//! The [`Lifecycle`] handle replaces a process-wide "shutting down" flag: it
//! is cloned into the worker loop and the listener accept path, and carries a
//! cancellation token that fires once shutdown begins.

mod probes;
mod shutdown;
mod signals;
mod state;

pub use probes::{HealthReporter, Liveness, Readiness};
pub use shutdown::{ExitIntent, ExitReason, ShutdownCoordinator, ShutdownError, ShutdownSignal};
pub use signals::Signals;
pub use state::{Lifecycle, LifecycleState};
