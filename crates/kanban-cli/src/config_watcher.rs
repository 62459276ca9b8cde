//! Config hot-reload watcher.
//!
//! Watches `kanban.toml` and hands the `[agent]` and `[tracker]` sections to
//! a callback after a debounce window.

use kanban_core::{KanbanError, KanbanResult};
use kanban_orchestrator::AgentConfig;
use kanban_tracker::TrackerConfig;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};

/// The sections that can change without a restart. Missing sections stay `None`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReloadableConfig {
    #[serde(default)]
    pub agent: Option<AgentConfig>,
    #[serde(default)]
    pub tracker: Option<TrackerConfig>,
}

/// Dropping the watcher stops the watch and ends the reload thread.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching `config_path`. `on_reload` runs on a background thread
    /// for every successfully parsed change; parse errors are logged and skipped.
    pub fn start<F>(config_path: PathBuf, debounce_ms: u64, on_reload: F) -> KanbanResult<Self>
    where
        F: Fn(ReloadableConfig) + Send + 'static,
    {
        let (tx, rx) = std_mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    let _ = tx.send(());
                }
            }
        })
        .map_err(|e| KanbanError::Config(format!("Failed to create file watcher: {e}")))?;

        watcher
            .watch(&config_path, RecursiveMode::NonRecursive)
            .map_err(|e| KanbanError::Config(format!("Failed to watch config file: {e}")))?;

        let path = config_path.clone();
        std::thread::spawn(move || {
            let debounce = Duration::from_millis(debounce_ms);
            while rx.recv().is_ok() {
                // Coalesce a burst of writes into one reload.
                std::thread::sleep(debounce);
                while rx.try_recv().is_ok() {}

                let started = Instant::now();
                match parse_config(&path) {
                    Ok(config) => {
                        on_reload(config);
                        tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Config reload applied");
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to reload config"),
                }
            }
            tracing::debug!("Config watcher thread exiting");
        });

        tracing::info!(path = %config_path.display(), "Config hot-reload watcher started");
        Ok(Self { _watcher: watcher })
    }
}

pub fn parse_config(path: &Path) -> KanbanResult<ReloadableConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        KanbanError::Config(format!("Failed to read config '{}': {e}", path.display()))
    })?;
    toml::from_str(&content).map_err(|e| {
        KanbanError::Config(format!("Failed to parse config '{}': {e}", path.display()))
    })
}
