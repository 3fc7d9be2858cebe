//! Hot reload of the relay configuration.
//!
//! The parent directory is watched rather than the file itself, so editors
//! that save by writing a temp file and renaming it over the original are
//! still picked up. A reload that fails to load or validate is logged and
//! dropped; the running configuration stays in place.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::RelayConfig;

/// Watches one configuration file and publishes each new valid version.
pub struct ConfigWatcher {
    path: PathBuf,
    current: RelayConfig,
    updates: mpsc::UnboundedSender<RelayConfig>,
}

impl ConfigWatcher {
    /// `current` is the configuration already in effect; reloads that produce
    /// an identical value are not published.
    pub fn new(path: &Path, current: RelayConfig) -> (Self, mpsc::UnboundedReceiver<RelayConfig>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            current,
            updates,
        };
        (watcher, rx)
    }

    /// Start watching. Updates stop when the returned handle is dropped.
    pub fn start(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            current,
            updates,
        } = self;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = path.file_name().map(|name| name.to_os_string());
        let last = Mutex::new(current);
        let target = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!(error = %e, "Config watch error");
                        return;
                    }
                };
                if !(event.kind.is_modify() || event.kind.is_create()) {
                    return;
                }
                let touches_target = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                if !touches_target {
                    return;
                }

                match load_config(&target) {
                    Ok(config) => {
                        let Ok(mut last) = last.lock() else {
                            return;
                        };
                        if *last == config {
                            tracing::debug!(path = ?target, "Config unchanged, skipping reload");
                            return;
                        }
                        *last = config.clone();
                        tracing::info!(path = ?target, "Config change detected, reloading");
                        let _ = updates.send(config);
                    }
                    Err(e) => {
                        tracing::error!(
                            path = ?target,
                            error = %e,
                            "Rejected config reload, keeping current configuration"
                        );
                    }
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}
