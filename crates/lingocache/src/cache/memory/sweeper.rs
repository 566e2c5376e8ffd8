//! Background task that purges expired TTL cache entries.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::TtlCache;

/// Shortest period the sweeper runs at. A zero period is raised to this.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to a running sweeper task.
///
/// The task holds only a weak reference to the cache, so it also exits on its
/// own once the cache is dropped.
#[derive(Debug)]
pub(super) struct Sweeper {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawns the sweeper loop on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub(super) fn spawn(cache: Weak<TtlCache>, every: Duration) -> Self {
        let every = if every.is_zero() {
            tracing::warn!(
                interval_ms = MIN_SWEEP_INTERVAL.as_millis() as u64,
                "Zero TTL cache sweep interval, using the minimum instead"
            );
            MIN_SWEEP_INTERVAL
        } else {
            every
        };
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);

            // Skip first tick (fires immediately)
            interval.tick().await;

            tracing::info!(
                interval_ms = every.as_millis() as u64,
                "Started TTL cache sweeper"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(cache) = cache.upgrade() else {
                            break;
                        };
                        cache.cleanup();
                    }

                    _ = shutdown_rx.recv() => {
                        tracing::debug!("Received shutdown signal, stopping TTL cache sweeper");
                        break;
                    }
                }
            }

            tracing::info!("TTL cache sweeper stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signals the task to stop. Does not wait for it.
    pub(super) fn stop(self) {
        // The receiver is gone only if the task already exited.
        let _ = self.shutdown_tx.send(());
    }

    pub(super) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
