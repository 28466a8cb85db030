//! Graceful shutdown controller for the relay.
//!
//! Listens for SIGINT/SIGTERM/SIGHUP and broadcasts a shutdown signal to
//! every task via a `tokio::sync::broadcast` channel.

use tokio::signal;
use tokio::sync::broadcast;

/// Coordinates graceful shutdown across all relay tasks.
///
/// Tasks call [`subscribe`](Self::subscribe) to get a receiver, then
/// `select!` on it alongside their main loop. When shutdown is triggered
/// (by OS signal or programmatically), every receiver is notified.
#[derive(Clone)]
pub struct ShutdownController {
    tx: broadcast::Sender<()>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Get a receiver that will be notified on shutdown.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }

    /// Wait for SIGINT, SIGTERM or SIGHUP (or a programmatic shutdown), then
    /// trigger shutdown.
    pub async fn wait_for_signal(&self) {
        let mut programmatic = self.subscribe();

        #[cfg(unix)]
        let unix_signals = async {
            use signal::unix::{signal as unix_signal, SignalKind};
            match (
                unix_signal(SignalKind::terminate()),
                unix_signal(SignalKind::hangup()),
            ) {
                (Ok(mut term), Ok(mut hup)) => {
                    tokio::select! {
                        _ = term.recv() => "SIGTERM",
                        _ = hup.recv() => "SIGHUP",
                    }
                }
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(error = %e, "cannot install signal handlers, only SIGINT is honoured");
                    std::future::pending::<&'static str>().await
                }
            }
        };

        #[cfg(not(unix))]
        let unix_signals = std::future::pending::<&'static str>();

        tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "SIGINT handler failed");
                }
                tracing::info!("received SIGINT, shutting down");
            }
            name = unix_signals => { tracing::info!(signal = name, "received signal, shutting down"); }
            _ = programmatic.recv() => { return; }
        }

        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
