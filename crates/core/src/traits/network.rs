//! Connectivity monitor port

use std::sync::Arc;
use tokio::sync::watch;

/// Reactive "network is good" signal.
pub trait NetworkMonitor: Send + Sync {
    /// Subscribe to connectivity changes. The receiver yields the current
    /// value immediately on first poll.
    fn subscribe(&self) -> watch::Receiver<bool>;

    /// Current connectivity judgement.
    fn is_good(&self) -> bool;
}

/// Monitor driven by explicit calls, for hosts that receive connectivity
/// events from the platform, and for tests.
#[derive(Debug)]
pub struct ManualNetwork {
    tx: watch::Sender<bool>,
}

impl ManualNetwork {
    pub fn new(initially_good: bool) -> Arc<Self> {
        let (tx, _) = watch::channel(initially_good);
        Arc::new(Self { tx })
    }

    /// Publish a new connectivity judgement.
    pub fn set_good(&self, good: bool) {
        // send_replace never fails even with no subscribers
        self.tx.send_replace(good);
    }
}

impl NetworkMonitor for ManualNetwork {
    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    fn is_good(&self) -> bool {
        *self.tx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_network_edges() {
        let net = ManualNetwork::new(false);
        let mut rx = net.subscribe();
        assert!(!net.is_good());

        net.set_good(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(net.is_good());
    }
}
