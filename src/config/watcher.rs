//! Hot reload of the gateway configuration
//!
//! The parent directory is watched rather than the file itself, so editors
//! that save by writing a temp file and renaming it into place are
//! still seen. Bursts of filesystem events collapse into one reload, and a
//! reload only surfaces when the DSP address or the feedback list differs
//! from the last accepted configuration.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

/// Quiet period after the last file event before the file is re-read
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(100);

/// An accepted configuration and what it changes for the running session
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChange {
    pub config: AppConfig,
    /// DSP host or port differs, the session must reconnect
    pub dsp_changed: bool,
    /// Feedback definitions differ, cached feedback output is stale
    pub feedbacks_changed: bool,
}

impl ConfigChange {
    pub fn between(old: &AppConfig, new: AppConfig) -> Self {
        Self {
            dsp_changed: old.dsp != new.dsp,
            feedbacks_changed: old.feedbacks != new.feedbacks,
            config: new,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.dsp_changed && !self.feedbacks_changed
    }
}

/// Watches the configuration file and yields validated changes
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
    current: AppConfig,
}

impl ConfigWatcher {
    /// Load the file and start watching it
    pub async fn new(config_path: impl Into<PathBuf>) -> Result<(Self, AppConfig)> {
        let path: PathBuf = config_path.into();
        let display = path.display().to_string();

        let initial = AppConfig::load(&display)
            .await
            .context("Failed to load initial config")?;

        let file_name = path
            .file_name()
            .map(OsString::from)
            .with_context(|| format!("Config path has no file name: {}", display))?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        // notify runs its callback on its own thread; an unbounded send needs no runtime
        let (touched_tx, touched_rx) = mpsc::unbounded_channel::<()>();
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) if touches(&event, &file_name) => {
                    debug!(kind = ?event.kind, "Config file event");
                    let _ = touched_tx.send(());
                },
                Ok(_) => {},
                Err(e) => error!("Config watch error: {}", e),
            }
        })?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config directory: {}", dir.display()))?;

        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(reload_loop(display.clone(), touched_rx, tx));

        info!("👀 Watching {} for changes", path.display());

        Ok((
            Self {
                _watcher: watcher,
                rx,
                current: initial.clone(),
            },
            initial,
        ))
    }

    /// Wait for the next configuration that changes something
    ///
    /// Rewrites that leave the DSP address and feedbacks as they were are
    /// swallowed. Returns `None` once the watcher is closed.
    pub async fn next_change(&mut self) -> Option<ConfigChange> {
        loop {
            let config = self.rx.recv().await?;
            let change = ConfigChange::between(&self.current, config);
            if change.is_empty() {
                debug!("Config file rewritten without changes");
                continue;
            }
            self.current = change.config.clone();
            return Some(change);
        }
    }
}

fn touches(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

/// Re-read the file once events go quiet and forward configs that validate
async fn reload_loop(
    path: String,
    mut touched: mpsc::UnboundedReceiver<()>,
    tx: mpsc::Sender<AppConfig>,
) {
    while touched.recv().await.is_some() {
        // Absorb the rest of the burst
        loop {
            match tokio::time::timeout(RELOAD_DEBOUNCE, touched.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        if !Path::new(&path).exists() {
            debug!("Config file {} is gone, waiting for it to return", path);
            continue;
        }

        match AppConfig::load(&path).await {
            Ok(config) => {
                if tx.send(config).await.is_err() {
                    return;
                }
            },
            Err(e) => warn!("❌ Ignoring invalid DSP config, keeping the running one: {:#}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NamedFeedback;
    use crate::feedback::Feedback;
    use std::fs;
    use tempfile::TempDir;

    fn config(host: &str, port: u16) -> AppConfig {
        let mut config = AppConfig::default();
        config.dsp.host = host.to_string();
        config.dsp.port = port;
        config
    }

    #[test]
    fn test_change_detects_endpoint() {
        let change = ConfigChange::between(&config("10.0.0.1", 48631), config("10.0.0.1", 5000));
        assert!(change.dsp_changed);
        assert!(!change.feedbacks_changed);
        assert_eq!(change.config.dsp.port, 5000);
    }

    #[test]
    fn test_change_detects_feedbacks_only() {
        let old = config("10.0.0.1", 48631);
        let mut new = old.clone();
        new.feedbacks.push(NamedFeedback {
            name: "link".to_string(),
            feedback: Feedback::Connected,
        });

        let change = ConfigChange::between(&old, new);
        assert!(!change.dsp_changed);
        assert!(change.feedbacks_changed);
    }

    #[test]
    fn test_identical_config_is_no_change() {
        let old = config("10.0.0.1", 48631);
        assert!(ConfigChange::between(&old, old.clone()).is_empty());
    }

    #[tokio::test]
    async fn test_config_watcher_reports_endpoint_change() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("symetrix.yaml");

        fs::write(&config_path, "dsp:\n  host: 10.0.0.1\n  port: 48631\n")?;

        let (mut watcher, initial) = ConfigWatcher::new(&config_path).await?;
        assert_eq!(initial.dsp.host, "10.0.0.1");

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&config_path, "dsp:\n  host: 10.0.0.2\n  port: 5000\n")?;

        let change = tokio::time::timeout(Duration::from_secs(2), watcher.next_change()).await;

        // Some platforms coalesce or drop events for quick rewrites
        if let Ok(Some(change)) = change {
            assert!(change.dsp_changed);
            assert_eq!(change.config.dsp.host, "10.0.0.2");
            assert_eq!(change.config.dsp.port, 5000);
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_initial_config_fails() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("broken.yaml");
        fs::write(&config_path, "dsp:\n  port: 0\n")?;

        assert!(ConfigWatcher::new(&config_path).await.is_err());
        Ok(())
    }
}
