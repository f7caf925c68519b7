//! Shutdown coordination.

use std::future::Future;

use tokio::sync::broadcast;

/// Fans one shutdown signal out to every long-running task.
///
/// Tasks that loop take a `broadcast::Receiver` via [`Shutdown::subscribe`];
/// one-shot waiters such as the HTTP server's graceful shutdown use
/// [`Shutdown::signalled`].
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Resolves once [`Shutdown::trigger`] is called after this point.
    pub fn signalled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    }

    pub fn trigger(&self) {
        let listeners = self.tx.send(()).unwrap_or(0);
        tracing::debug!(listeners, "Shutdown triggered");
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
