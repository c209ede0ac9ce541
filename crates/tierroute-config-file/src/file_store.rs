//! File-backed configuration store with change watching

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use futures::{Stream, stream};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use tierroute_core::{Error, Result};

use crate::config::{TierrouteConfig, expand_tilde};

/// A configuration that was reloaded after the file changed
#[derive(Debug, Clone)]
pub struct ConfigReload {
    pub config: TierrouteConfig,
    pub version: u32,
    pub timestamp: DateTime<Utc>,
}

pub type ConfigReloadStream = Pin<Box<dyn Stream<Item = ConfigReload> + Send>>;

/// Configuration stored in a single YAML or TOML file
#[derive(Debug)]
pub struct FileConfigStore {
    /// Path to the configuration file
    config_path: PathBuf,
    /// Incremented on every successful reload
    version: Arc<AtomicU32>,
}

impl FileConfigStore {
    /// Open a configuration file, expanding a leading `~`
    ///
    /// # Errors
    /// - `Error::ConfigNotFound` if the file doesn't exist
    /// - `Error::Config` if the home directory can't be determined
    pub async fn new(config_path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = expand_tilde(&config_path.into())?;

        if !tokio::fs::try_exists(&config_path).await.unwrap_or(false) {
            return Err(Error::ConfigNotFound);
        }

        info!("Initialized FileConfigStore for {:?}", config_path);

        Ok(Self {
            config_path,
            version: Arc::new(AtomicU32::new(1)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    /// Read, apply environment overrides and validate
    pub fn load(&self) -> Result<TierrouteConfig> {
        load_from(&self.config_path)
    }

    /// Stream of configurations loaded after each change to the file
    ///
    /// Invalid edits are logged and skipped; the stream only yields
    /// configurations that pass validation. The watcher stops when the
    /// stream is dropped and the next event is observed.
    pub fn watch_changes(&self) -> Result<ConfigReloadStream> {
        let (tx, rx) = mpsc::channel(16);

        let config_path = self.config_path.clone();
        let version = self.version.clone();

        // Editors often replace the file, so watch its directory
        let watch_dir = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                if let Err(e) = notify_tx.send(res) {
                    debug!("File watch receiver gone: {}", e);
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| Error::Config(format!("Failed to create file watcher: {}", e)))?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Config(format!("Failed to watch {:?}: {}", watch_dir, e)))?;

        info!("Watching config file for changes: {:?}", config_path);

        tokio::task::spawn_blocking(move || {
            // Keep the watcher alive for the lifetime of this task
            let _watcher = watcher;

            while let Ok(event_result) = notify_rx.recv() {
                let event = match event_result {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("File watch error: {}", e);
                        continue;
                    }
                };

                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
                    || !event.paths.iter().any(|p| same_file(p, &config_path))
                {
                    continue;
                }

                let config = match load_from(&config_path) {
                    Ok(config) => config,
                    Err(e) => {
                        warn!("Ignoring config change, reload failed: {}", e);
                        continue;
                    }
                };

                let reload = ConfigReload {
                    config,
                    version: version.fetch_add(1, Ordering::SeqCst) + 1,
                    timestamp: Utc::now(),
                };

                if tx.blocking_send(reload).is_err() {
                    debug!("Config change stream closed, stopping watcher");
                    break;
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        Ok(Box::pin(stream))
    }
}

fn load_from(path: &Path) -> Result<TierrouteConfig> {
    let mut config = TierrouteConfig::from_file(path)?;
    config.merge_env();
    config.validated().inspect_err(|e| {
        error!("Invalid configuration in {:?}: {}", path, e);
    })
}

fn same_file(event_path: &Path, config_path: &Path) -> bool {
    event_path == config_path || event_path.file_name() == config_path.file_name()
}
