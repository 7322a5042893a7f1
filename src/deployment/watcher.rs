//! Manifest file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::deployment::manifest::load_deployment;
use crate::deployment::Deployment;

/// Monitors the deployment manifest and publishes recompiled deployments.
pub struct ManifestWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<Deployment>,
}

impl ManifestWatcher {
    /// Returns the watcher and a receiver for deployment updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<Deployment>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Manifest change detected, reloading...");
                        match load_deployment(&path) {
                            Ok(deployment) => {
                                tracing::info!(
                                    build_id = %deployment.build_id,
                                    rules = deployment.routes.len(),
                                    "Deployment reloaded"
                                );
                                let _ = tx.send(deployment);
                            }
                            Err(e) => {
                                tracing::error!(
                                    "Failed to reload manifest: {}. Keeping current deployment.",
                                    e
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Manifest watcher started");
        Ok(watcher)
    }
}
