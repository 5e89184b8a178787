//! Fleet-wide shutdown signal.
//!
//! A single watch channel fans out to every worker and background task.
//! Receivers can check the flag, await it, or run a shutdown-interruptible
//! sleep so no blocked wait outlives the fleet.

use std::time::Duration;

use tokio::sync::watch;

/// Sending half of the shutdown signal, held by the coordinator.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Signal every subscriber to stop.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    /// Create a new subscriber.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving half, cloned into each worker and background task.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Create a fresh signal pair.
    pub fn new() -> (ShutdownHandle, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownHandle { tx }, Shutdown { rx })
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until shutdown is requested.
    ///
    /// Resolves immediately if the signal already fired or the sender side
    /// is gone.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // A dropped sender means the coordinator is gone; treat as shutdown.
        let _ = rx.wait_for(|stopping| *stopping).await;
    }

    /// Sleep for `duration` unless shutdown arrives first.
    ///
    /// Returns `true` if the full duration elapsed, `false` if interrupted.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.wait() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flag_starts_clear() {
        let (_handle, shutdown) = Shutdown::new();
        assert!(!shutdown.is_shutdown());
    }

    #[tokio::test]
    async fn test_signal_reaches_all_subscribers() {
        let (handle, first) = Shutdown::new();
        let second = handle.subscribe();

        handle.shutdown();

        assert!(first.is_shutdown());
        assert!(second.is_shutdown());
        first.wait().await;
        second.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_runs_to_completion() {
        let (_handle, shutdown) = Shutdown::new();
        assert!(shutdown.sleep(Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted_by_shutdown() {
        let (handle, shutdown) = Shutdown::new();

        let sleeper = tokio::spawn(async move { shutdown.sleep(Duration::from_secs(3600)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.shutdown();

        assert!(!sleeper.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_resolves_when_sender_dropped() {
        let (handle, shutdown) = Shutdown::new();
        drop(handle);
        shutdown.wait().await;
    }
}
