//! Configuration file watcher for hot reload.
//!
//! Watches the file's directory rather than the file itself, so editors that
//! save by writing a new file and renaming it over the old one keep being
//! followed. A single save tends to fire several notify events; they are
//! collapsed into one reload after a quiet period, and a reload whose
//! content matches the last forwarded config is dropped.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ClientConfig;

/// Quiet period after the last file event before reloading.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    debounce: Duration,
    update_tx: mpsc::UnboundedSender<ClientConfig>,
}

/// Keeps the watch alive; dropping it stops the watcher and its reload task.
pub struct WatchHandle {
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ClientConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                debounce: DEFAULT_DEBOUNCE,
                update_tx,
            },
            update_rx,
        )
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching. Must be called within a tokio runtime.
    pub fn run(self) -> Result<WatchHandle, notify::Error> {
        let file_name = self.path.file_name().map(OsString::from).ok_or_else(|| {
            notify::Error::generic(&format!("{} does not name a file", self.path.display()))
        })?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let touches_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()));
                    if touches_file && (event.kind.is_modify() || event.kind.is_create()) {
                        let _ = event_tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tokio::spawn(reload_on_change(
            self.path.clone(),
            self.debounce,
            event_rx,
            self.update_tx,
        ));

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(WatchHandle { _watcher: watcher })
    }
}

/// Reload once per burst of file events and forward configs that changed.
/// Ends when the watcher is dropped or nobody listens for updates.
async fn reload_on_change(
    path: PathBuf,
    debounce: Duration,
    mut events: mpsc::UnboundedReceiver<()>,
    updates: mpsc::UnboundedSender<ClientConfig>,
) {
    let mut last: Option<ClientConfig> = None;

    while events.recv().await.is_some() {
        loop {
            match tokio::time::timeout(debounce, events.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        match load_config(&path) {
            Ok(config) if last.as_ref() == Some(&config) => {
                tracing::debug!(path = ?path, "Config file touched, content unchanged");
            }
            Ok(config) => {
                tracing::debug!(path = ?path, endpoints = ?config.endpoints, "Config reloaded");
                last = Some(config.clone());
                if updates.send(config).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "Failed to reload config, keeping current configuration");
            }
        }
    }
}
