use std::sync::Arc;

use tokio::sync::watch;

/// A flag that is raised at most once and can be awaited by any number of tasks.
///
/// Waiting on an already raised signal completes immediately.
#[derive(Debug, Clone)]
pub(crate) struct Signal {
    tx: Arc<watch::Sender<bool>>,
}

impl Signal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Signal { tx: Arc::new(tx) }
    }

    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn fired(&self) {
        let mut rx = self.tx.subscribe();
        if rx.wait_for(|fired| *fired).await.is_err() {
            // Can't happen while `self` holds the sender
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn wakes_every_waiter() {
        let signal = Signal::new();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let signal = signal.clone();
                tokio::spawn(async move { signal.fired().await })
            })
            .collect();

        tokio::task::yield_now().await;
        assert!(!signal.is_fired());
        signal.fire();

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter should have been woken")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn late_waiters_return_immediately() {
        let signal = Signal::new();
        signal.fire();
        signal.fire();

        assert!(signal.is_fired());
        tokio::time::timeout(Duration::from_millis(100), signal.fired())
            .await
            .expect("should have returned immediately");
    }

    #[tokio::test]
    async fn unfired_signal_keeps_waiting() {
        let signal = Signal::new();
        assert!(tokio::time::timeout(Duration::from_millis(50), signal.fired())
            .await
            .is_err());
    }
}
