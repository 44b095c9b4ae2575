//! Configuration file watcher for hot reload.
//!
//! The watcher only detects changes. Filesystem events are debounced and one
//! trigger is forwarded per batch that touches the config file; parsing and
//! publishing happen on the applier task that owns the snapshot (see
//! [`ConfigStore::watch`](crate::config::ConfigStore::watch)).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, FileIdMap};
use tokio::sync::mpsc;

/// Editors typically emit several events per save.
const DEBOUNCE_TIMEOUT: Duration = Duration::from_millis(100);

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    trigger_tx: mpsc::UnboundedSender<()>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver of reload triggers.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();

        (Self {
            path: path.to_path_buf(),
            trigger_tx,
        }, trigger_rx)
    }

    /// Start watching in a background thread.
    ///
    /// The parent directory is watched rather than the file itself so that
    /// editors which save by rename keep triggering reloads.
    pub fn run(self) -> Result<Debouncer<RecommendedWatcher, FileIdMap>, notify::Error> {
        let tx = self.trigger_tx.clone();
        let file_name: Option<OsString> = self.path.file_name().map(|n| n.to_os_string());
        let dir = watch_dir(&self.path);

        let mut debouncer = new_debouncer(DEBOUNCE_TIMEOUT, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let touched = events.iter().any(|event| {
                        (event.kind.is_modify() || event.kind.is_create())
                            && event
                                .paths
                                .iter()
                                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name)
                    });
                    if touched {
                        tracing::debug!(events = events.len(), "Config file change detected");
                        let _ = tx.send(());
                    }
                }
                Err(errors) => {
                    for e in errors {
                        tracing::error!("Watch error: {:?}", e);
                    }
                }
            }
        })?;

        debouncer.watcher().watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(debouncer)
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_file_name_watches_working_directory() {
        assert_eq!(watch_dir(Path::new("config.toml")), PathBuf::from("."));
        assert_eq!(watch_dir(Path::new("/etc/app/config.toml")), PathBuf::from("/etc/app"));
    }

    #[tokio::test]
    async fn burst_of_writes_yields_one_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = 1").unwrap();

        let (watcher, mut triggers) = ConfigWatcher::new(&path);
        let _debouncer = watcher.run().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        for port in 2..6 {
            std::fs::write(&path, format!("port = {port}")).unwrap();
        }

        tokio::time::timeout(Duration::from_secs(10), triggers.recv())
            .await
            .expect("trigger within timeout")
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(triggers.try_recv().is_err());
    }
}
