//! Acknowledged shutdown signal.
//!
//! A single-fire notification with a completion handshake: the requester
//! fires once and then blocks until the observer reports that the listening
//! endpoint is fully closed. Armed when the dispatcher is created; firing a
//! second time is impossible because [`ShutdownHandle::shutdown`] consumes
//! the handle.

use tokio::sync::{mpsc, watch};

/// Requester side of the shutdown signal.
pub struct ShutdownHandle {
    stop_tx: watch::Sender<bool>,
    ack_rx: mpsc::Receiver<()>,
}

/// Observer side, held by the dispatcher's accept loop.
pub struct ShutdownListener {
    stop_rx: watch::Receiver<bool>,
    ack_tx: mpsc::Sender<()>,
}

/// Create a connected handle/listener pair.
pub fn shutdown_pair() -> (ShutdownHandle, ShutdownListener) {
    let (stop_tx, stop_rx) = watch::channel(false);
    let (ack_tx, ack_rx) = mpsc::channel(1);

    (
        ShutdownHandle { stop_tx, ack_rx },
        ShutdownListener { stop_rx, ack_tx },
    )
}

impl ShutdownHandle {
    /// Request shutdown and wait for the acknowledgment.
    ///
    /// Returns once the observer has acknowledged (or has gone away
    /// entirely, in which case there is nothing left to wait for).
    pub async fn shutdown(mut self) {
        let _ = self.stop_tx.send(true);
        let _ = self.ack_rx.recv().await;
    }
}

impl ShutdownListener {
    /// Wait until shutdown has been requested.
    ///
    /// Also resolves if the handle was dropped without firing: an observer
    /// with no remaining requester can never be stopped otherwise.
    pub async fn requested(&mut self) {
        while !*self.stop_rx.borrow_and_update() {
            if self.stop_rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Acknowledge that the observed resource is fully released.
    pub fn ack(self) {
        let _ = self.ack_tx.try_send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn shutdown_waits_for_ack() {
        let (handle, mut listener) = shutdown_pair();
        let acked = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let acked_clone = acked.clone();

        tokio::spawn(async move {
            listener.requested().await;
            // Simulate the endpoint taking a moment to close.
            tokio::time::sleep(Duration::from_millis(50)).await;
            acked_clone.store(true, std::sync::atomic::Ordering::SeqCst);
            listener.ack();
        });

        timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("shutdown should complete once acknowledged");
        assert!(acked.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn shutdown_does_not_hang_if_listener_is_gone() {
        let (handle, listener) = shutdown_pair();
        drop(listener);

        timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("shutdown must not hang without a listener");
    }

    #[tokio::test]
    async fn dropped_handle_releases_the_listener() {
        let (handle, mut listener) = shutdown_pair();
        drop(handle);

        timeout(Duration::from_secs(1), listener.requested())
            .await
            .expect("requested must resolve when the handle is gone");
    }

    #[tokio::test]
    async fn requested_resolves_after_fire() {
        let (handle, mut listener) = shutdown_pair();

        let waiter = tokio::spawn(async move {
            listener.requested().await;
            listener.ack();
        });

        handle.shutdown().await;
        waiter.await.unwrap();
    }
}
