//! Shutdown coordination for background tasks.

use tokio::sync::watch;

/// Coordinator for client shutdown.
///
/// Backed by a watch channel so tasks that subscribe after the trigger
/// still observe it.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the shutdown signal. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Number of live subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half handed to background tasks.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown is triggered or the coordinator is dropped.
    pub async fn recv(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_late_subscriber_sees_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        shutdown.trigger();

        let mut signal = shutdown.subscribe();
        assert!(signal.is_triggered());
        tokio::time::timeout(Duration::from_millis(100), signal.recv())
            .await
            .expect("already triggered");
    }

    #[tokio::test]
    async fn test_waiting_subscriber_wakes() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 1);

        let waiter = tokio::spawn(async move { signal.recv().await });
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(shutdown.is_triggered());
    }
}
