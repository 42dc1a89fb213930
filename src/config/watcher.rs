//! Hot reload of the gateway config file
//!
//! The watch is on the parent directory so editors that save through a
//! temporary file and a rename are still seen. Filesystem events only mark
//! the file dirty; a single reload task waits for the burst to settle, reads
//! the file once and forwards it only when the parsed settings differ from
//! the last ones delivered. The guest's INIT re-reads the same file through
//! [`AppConfig::load`], so both paths see identical content.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

/// Quiet period after the last event before the file is read
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(100);

/// Delivers parsed settings whenever the config file's content changes
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    updates: mpsc::Receiver<AppConfig>,
}

impl ConfigWatcher {
    /// Load `config_path` and start watching it
    pub async fn new(config_path: PathBuf) -> Result<(Self, Arc<AppConfig>)> {
        let initial = AppConfig::load(&config_path)
            .await
            .context("Failed to load initial config")?;

        let file_name = config_path
            .file_name()
            .map(OsString::from)
            .with_context(|| format!("Config path has no file name: {}", config_path.display()))?;
        let watch_dir = match config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        // The notify callback runs on its own thread; an unbounded send never blocks it
        let (dirty_tx, dirty_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) if touches(&event, &file_name) => {
                    debug!(kind = ?event.kind, "Config file event");
                    let _ = dirty_tx.send(());
                }
                Ok(_) => {}
                Err(e) => error!("Config watch error: {}", e),
            }
        })?;
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", watch_dir.display()))?;

        let (updates_tx, updates) = mpsc::channel(4);
        tokio::spawn(reload_loop(
            config_path.clone(),
            dirty_rx,
            updates_tx,
            initial.clone(),
        ));

        info!("Watching {} for changes", config_path.display());

        Ok((
            Self {
                _watcher: watcher,
                updates,
            },
            Arc::new(initial),
        ))
    }

    /// Next changed configuration; `None` once the watcher is gone
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.updates.recv().await
    }
}

/// Content changes to the watched file; metadata-only events are skipped
fn touches(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(file_name.as_os_str()))
}

/// Coalesce dirty marks, re-read, and forward changed settings
///
/// Ends when the watcher (the only dirty sender) or the update receiver is
/// dropped.
async fn reload_loop(
    path: PathBuf,
    mut dirty: mpsc::UnboundedReceiver<()>,
    updates: mpsc::Sender<AppConfig>,
    mut current: AppConfig,
) {
    while dirty.recv().await.is_some() {
        settle(&mut dirty).await;

        match AppConfig::load(&path).await {
            Ok(next) if next == current => debug!("Config file touched, settings unchanged"),
            Ok(next) => {
                info!("Configuration reloaded from {}", path.display());
                current = next.clone();
                if updates.send(next).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!("Keeping current settings, reload failed: {:#}", e),
        }
    }
    debug!("Config reload loop stopped");
}

/// Wait until no further mark arrives for a full debounce period
async fn settle(dirty: &mut mpsc::UnboundedReceiver<()>) {
    while let Ok(Some(())) = tokio::time::timeout(RELOAD_DEBOUNCE, dirty.recv()).await {}
}
