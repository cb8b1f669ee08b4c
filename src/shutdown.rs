//! Cooperative shutdown signalling.
//!
//! A [`Shutdown`] handle is threaded through every blocking operation in the
//! pruner; cluster calls, rate-limit sleeps, and backoff sleeps all observe
//! it and abort promptly with [`Error::Cancelled`] once the process receives
//! a termination signal. In-flight deletions are never rolled back, only
//! unstarted ones are skipped.

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

/// Receiving side of the shutdown channel.
///
/// Cheap to clone; every clone observes the same signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Sending side of the shutdown channel. Triggering is idempotent.
#[derive(Debug)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl ShutdownSignal {
    /// Signals shutdown to every [`Shutdown`] handle.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

impl Shutdown {
    /// Creates a connected signal/handle pair.
    #[must_use]
    pub fn channel() -> (ShutdownSignal, Self) {
        let (tx, rx) = watch::channel(false);
        (ShutdownSignal { tx }, Self { rx })
    }

    /// Returns `true` if shutdown has been requested.
    ///
    /// A dropped [`ShutdownSignal`] counts as a request; the daemon cannot
    /// keep running with no way left to stop it.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Returns [`Error::Cancelled`] if shutdown has been requested.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] once the signal has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Resolves once shutdown is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleeps for `duration`, aborting early on shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if shutdown fires before the sleep
    /// completes.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            () = self.cancelled() => Err(Error::Cancelled),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Races a fallible operation against shutdown, abandoning it if the
    /// signal fires first. The future is dropped on cancellation; a stuck
    /// cluster call cannot hold up process exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if shutdown fires before the operation
    /// completes, otherwise the operation's own result.
    pub async fn guard<T>(&self, operation: impl Future<Output = Result<T>> + Send) -> Result<T> {
        tokio::select! {
            () = self.cancelled() => Err(Error::Cancelled),
            result = operation => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_check_passes_until_triggered() {
        let (signal, shutdown) = Shutdown::channel();
        assert!(shutdown.check().is_ok());

        signal.trigger();
        assert!(shutdown.is_cancelled());
        assert!(matches!(shutdown.check(), Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_sleep_aborts_on_trigger() {
        let (signal, shutdown) = Shutdown::channel();

        let sleeper = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { shutdown.sleep(Duration::from_secs(3600)).await }
        });

        signal.trigger();
        let result = sleeper.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_sleep_completes_without_trigger() {
        let (_signal, shutdown) = Shutdown::channel();
        shutdown.sleep(Duration::from_millis(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_signal_counts_as_shutdown() {
        let (signal, shutdown) = Shutdown::channel();
        drop(signal);
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_guard_passes_through_completed_operation() {
        let (_signal, shutdown) = Shutdown::channel();
        let value = shutdown.guard(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_guard_abandons_stuck_operation_on_trigger() {
        let (signal, shutdown) = Shutdown::channel();
        signal.trigger();

        let result = shutdown.guard(std::future::pending::<Result<()>>()).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
