//! Services file watcher for immediate reload.
//!
//! The config manager polls its source on a fixed interval regardless; the
//! watcher only shortens the delay for file sources by sending a reload
//! trigger as soon as the file changes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Watches one file and emits a trigger per modification.
pub struct ServicesWatcher {
    path: PathBuf,
    trigger_tx: mpsc::UnboundedSender<()>,
}

impl ServicesWatcher {
    /// Create a new watcher.
    ///
    /// Returns the watcher and a receiver for reload triggers.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                trigger_tx,
            },
            trigger_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.trigger_tx;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Services file change detected, triggering reload");
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Services watcher started");
        Ok(watcher)
    }
}
