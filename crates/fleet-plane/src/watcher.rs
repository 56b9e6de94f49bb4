use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::PluginError;

/// A filesystem change to a module file, debounced so a single `cp`/link
/// dance doesn't fire a reload per intermediate write.
#[derive(Debug, Clone)]
pub struct ReloadSignal {
    pub path: PathBuf,
}

/// Watches the plugin directory and emits debounced reload signals.
///
/// `notify` delivers raw, possibly-bursty filesystem events on its own
/// thread; this holds the watcher alive for the lifetime of the channel
/// and folds repeated events for the same path into one signal per
/// `debounce` window.
pub struct ModuleWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<ReloadSignal>,
}

impl ModuleWatcher {
    pub fn new(directory: impl Into<PathBuf>, debounce: Duration) -> Result<Self, PluginError> {
        let directory = directory.into();
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Event>();
        let (signal_tx, signal_rx) = mpsc::channel::<ReloadSignal>(64);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = raw_tx.send(event);
            }
            Err(e) => warn!(error = %e, "module watcher error"),
        })?;

        if directory.exists() {
            watcher.watch(&directory, RecursiveMode::NonRecursive)?;
        }

        tokio::spawn(async move {
            let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
            loop {
                let deadline = tokio::time::sleep(debounce);
                tokio::select! {
                    maybe_event = raw_rx.recv() => {
                        let Some(event) = maybe_event else { break };
                        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)) {
                            continue;
                        }
                        for path in event.paths {
                            pending.insert(path, Instant::now());
                        }
                    }
                    _ = deadline => {
                        let now = Instant::now();
                        let ready: Vec<PathBuf> = pending
                            .iter()
                            .filter(|(_, seen)| now.duration_since(**seen) >= debounce)
                            .map(|(p, _)| p.clone())
                            .collect();
                        for path in ready {
                            pending.remove(&path);
                            debug!(path = %path.display(), "module change debounced, signaling reload");
                            if signal_tx.send(ReloadSignal { path }).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            rx: signal_rx,
        })
    }

    pub async fn recv(&mut self) -> Option<ReloadSignal> {
        self.rx.recv().await
    }
}
