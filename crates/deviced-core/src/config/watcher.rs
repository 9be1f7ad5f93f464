//! Configuration file watching.
//!
//! Bridges a notify watcher into a tokio channel. Events coalesce the same
//! way wake signals do: a burst of filesystem events while one is pending
//! collapses into a single notification.

use std::path::Path;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::Result;

/// Watches the configuration file for changes.
pub struct ConfigWatcher {
    // Held for its Drop; dropping stops the watch thread.
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<()>,
}

impl ConfigWatcher {
    /// Starts watching the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher cannot be created or the path cannot
    /// be watched (e.g. the file does not exist).
    pub fn new(path: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::channel(1);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else { return };
            if matches!(
                event.kind,
                EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
            ) {
                trace!(kind = ?event.kind, "config file event");
                let _ = tx.try_send(());
            }
        })?;
        watcher.watch(path, RecursiveMode::NonRecursive)?;
        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Waits for the next change notification. Returns `None` if the
    /// watcher backend has gone away.
    pub async fn changed(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}
