//! The live configuration snapshot.
//!
//! `ConfigStore` holds the active `Arc<AppConfig>` in an `ArcSwap`. Readers
//! take a cheap reference with [`ConfigStore::snapshot`]; the reload path
//! builds a complete document first and then swaps the pointer, so no reader
//! ever observes fields from two different documents.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use notify::RecommendedWatcher;
use notify_debouncer_full::{Debouncer, FileIdMap};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::loader::{load_config, ConfigError, DEFAULT_CONFIG_PATH};
use crate::config::schema::AppConfig;
use crate::config::watcher::ConfigWatcher;

/// Owner of the active configuration document.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: ArcSwap<AppConfig>,
}

impl ConfigStore {
    /// Load the initial snapshot from `path`, or `config.toml` when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let config = load_config(&path)?;
        Ok(Self::new(path, config))
    }

    /// Wrap an already validated document.
    pub fn new(path: PathBuf, config: AppConfig) -> Self {
        Self {
            path,
            current: ArcSwap::from_pointee(config),
        }
    }

    /// Source file of this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The active snapshot.
    pub fn snapshot(&self) -> Arc<AppConfig> {
        self.current.load_full()
    }

    /// Replace the active snapshot with a complete document.
    pub fn publish(&self, config: AppConfig) -> Arc<AppConfig> {
        let next = Arc::new(config);
        self.current.store(Arc::clone(&next));
        next
    }

    /// Re-read the source file.
    ///
    /// On failure the current snapshot stays active and the error is logged
    /// once; it is also returned so callers can react.
    pub fn reload(&self) -> Result<Arc<AppConfig>, ConfigError> {
        match load_config(&self.path) {
            Ok(config) => Ok(self.publish(config)),
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to reload config, keeping current configuration"
                );
                Err(e)
            }
        }
    }

    /// Watch the source file and republish on every change.
    ///
    /// `on_change` runs on the applier task after a changed document has been
    /// published. Must be called inside a Tokio runtime.
    pub fn watch<F>(self: &Arc<Self>, on_change: F) -> Result<WatchHandle, ConfigError>
    where
        F: Fn(Arc<AppConfig>) + Send + Sync + 'static,
    {
        let (watcher, triggers) = ConfigWatcher::new(&self.path);
        let watcher = watcher.run().map_err(|source| ConfigError::Watch {
            path: self.path.clone(),
            source,
        })?;

        let applier = tokio::spawn(apply_reloads(Arc::clone(self), triggers, on_change));

        Ok(WatchHandle {
            _watcher: watcher,
            applier,
        })
    }
}

/// Single writer of the snapshot while watching. Each trigger is one
/// debounced batch of filesystem events.
async fn apply_reloads<F>(store: Arc<ConfigStore>, mut triggers: mpsc::UnboundedReceiver<()>, on_change: F)
where
    F: Fn(Arc<AppConfig>),
{
    while triggers.recv().await.is_some() {
        let previous = store.snapshot();
        if let Ok(next) = store.reload() {
            if *next == *previous {
                tracing::debug!("Config file touched without changes");
                continue;
            }
            tracing::info!(path = %store.path.display(), "Configuration reloaded");
            on_change(next);
        }
    }
}

/// Keeps the watcher alive; dropping it stops watching.
pub struct WatchHandle {
    _watcher: Debouncer<RecommendedWatcher, FileIdMap>,
    applier: JoinHandle<()>,
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.applier.abort();
    }
}
