//! Cooperative cancellation carrier.
//!
//! Every operation that sleeps, performs HTTP, or waits on a subprocess
//! accepts a [`CancelSignal`] and races its work against
//! [`wait_cancelled`] via `tokio::select!`.

use once_cell::sync::Lazy;
use tokio::sync::watch;

/// Cloneable cancellation receiver; `true` means cancelled.
pub type CancelSignal = watch::Receiver<bool>;

static NEVER: Lazy<watch::Sender<bool>> = Lazy::new(|| watch::channel(false).0);

/// A signal that never fires, for tests and callers without a
/// cancellation source.
pub fn never_cancelled() -> CancelSignal {
    NEVER.subscribe()
}

/// Create a linked (sender, receiver) pair. Send `true` to cancel.
pub fn cancel_pair() -> (watch::Sender<bool>, CancelSignal) {
    watch::channel(false)
}

/// Whether the signal has already fired.
pub fn is_cancelled(cancel: &CancelSignal) -> bool {
    *cancel.borrow()
}

/// Resolve once the signal fires. Never resolves for a signal whose
/// sender has gone away without cancelling.
pub async fn wait_cancelled(cancel: &CancelSignal) {
    let mut rx = cancel.clone();
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender dropped; cancellation can no longer fire.
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_never_cancelled_does_not_fire() {
        let cancel = never_cancelled();
        assert!(!is_cancelled(&cancel));
        let fired = tokio::time::timeout(Duration::from_millis(20), wait_cancelled(&cancel)).await;
        assert!(fired.is_err());
    }

    #[tokio::test]
    async fn test_cancel_pair_fires() {
        let (tx, cancel) = cancel_pair();
        let waiter = tokio::spawn(async move { wait_cancelled(&cancel).await });
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_already_cancelled_resolves_immediately() {
        let (tx, cancel) = cancel_pair();
        tx.send(true).unwrap();
        assert!(is_cancelled(&cancel));
        tokio::time::timeout(Duration::from_millis(20), wait_cancelled(&cancel))
            .await
            .unwrap();
    }
}
