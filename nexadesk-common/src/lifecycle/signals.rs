use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};

use super::shutdown::ShutdownSignal;

/// SIGTERM and SIGINT listeners. Both mean the same thing: shut down gracefully.
pub struct Signals {
    term: Signal,
    interrupt: Signal,
}

impl Signals {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            term: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    /// Wait for the next signal. Returns None once the signal streams are closed.
    pub async fn recv(&mut self) -> Option<ShutdownSignal> {
        tokio::select! {
            received = self.term.recv() => received.map(|_| ShutdownSignal::Terminate),
            received = self.interrupt.recv() => received.map(|_| ShutdownSignal::Interrupt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn waits_for_a_signal() {
        // We can't easily send ourselves a signal here, check it does not resolve on its own.
        let mut signals = Signals::new().unwrap();
        let result = timeout(Duration::from_millis(100), signals.recv()).await;

        assert!(result.is_err(), "recv should not complete without a signal");
    }
}
