use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::PluginError;
use crate::loader::{LoadedModule, ModuleLoader};
use crate::module::{LoadResult, ModuleState};
use crate::watcher::ModuleWatcher;

struct Entry {
    loaded: LoadedModule,
    commands: HashMap<String, usize>,
    state: ModuleState,
}

/// Holds every loaded module and routes command invocations by name.
///
/// The command table is rebuilt wholesale on each (re)load rather than
/// patched incrementally — modules are swapped as a unit, never merged,
/// so a reload can never leave half-old, half-new commands registered.
pub struct CommandRegistry {
    directory: PathBuf,
    load_timeout: Duration,
    max_retries: u32,
    entries: RwLock<HashMap<String, Entry>>,
}

impl CommandRegistry {
    pub fn new(directory: impl Into<PathBuf>, load_timeout: Duration, max_retries: u32) -> Arc<Self> {
        Arc::new(Self {
            directory: directory.into(),
            load_timeout,
            max_retries,
            entries: RwLock::new(HashMap::new()),
        })
    }

    /// Loads every module in the plugin directory, replacing whatever
    /// was previously registered. Individual module failures are
    /// recorded but do not abort the overall load.
    pub async fn load_all(&self) -> Vec<LoadResult> {
        let loader = ModuleLoader::new(self.directory.clone(), self.load_timeout, self.max_retries);
        let results = loader.load_all().await;

        let mut entries = self.entries.write().await;
        entries.clear();
        let mut summaries = Vec::with_capacity(results.len());
        for (result, loaded) in results {
            if let Some(loaded) = loaded {
                let commands: HashMap<String, usize> = loaded
                    .module
                    .commands()
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (c.name().to_string(), i))
                    .collect();
                entries.insert(
                    result.module_name.clone(),
                    Entry {
                        loaded,
                        commands,
                        state: ModuleState::Loaded,
                    },
                );
            }
            summaries.push(result);
        }
        summaries
    }

    /// Reloads a single module by name, replacing its previous entry.
    pub async fn reload(&self, path: &std::path::Path) -> LoadResult {
        let loader = ModuleLoader::new(self.directory.clone(), self.load_timeout, self.max_retries);
        let (result, loaded) = loader.load_one(path).await;
        if let Some(loaded) = loaded {
            let commands: HashMap<String, usize> = loaded
                .module
                .commands()
                .iter()
                .enumerate()
                .map(|(i, c)| (c.name().to_string(), i))
                .collect();
            let mut entries = self.entries.write().await;
            entries.insert(
                result.module_name.clone(),
                Entry {
                    loaded,
                    commands,
                    state: ModuleState::Reloading,
                },
            );
        }
        result
    }

    /// Invokes `command` wherever it is registered, searching loaded
    /// modules in insertion order and returning the first match's result.
    pub async fn dispatch(&self, command: &str, args: Value) -> Result<Value, PluginError> {
        let entries = self.entries.read().await;
        for (module_name, entry) in entries.iter() {
            if let Some(&idx) = entry.commands.get(command) {
                let commands = entry.loaded.module.commands();
                let cmd = &commands[idx];
                return cmd.run(args).await.map_err(|e| PluginError::CommandFailed {
                    module: module_name.clone(),
                    command: command.to_string(),
                    message: e.to_string(),
                });
            }
        }
        Err(PluginError::UnknownCommand(command.to_string()))
    }

    pub async fn list_commands(&self) -> Vec<(String, String)> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .flat_map(|(module, entry)| entry.commands.keys().map(move |c| (module.clone(), c.clone())))
            .collect()
    }

    pub async fn states(&self) -> HashMap<String, ModuleState> {
        let entries = self.entries.read().await;
        entries.iter().map(|(name, e)| (name.clone(), e.state)).collect()
    }

    /// Spawns a background task that watches the plugin directory and
    /// reloads modules as their files change.
    pub fn watch(self: &Arc<Self>, debounce: Duration) -> Result<(), PluginError> {
        let registry = Arc::clone(self);
        let mut watcher = ModuleWatcher::new(registry.directory.clone(), debounce)?;
        tokio::spawn(async move {
            while let Some(signal) = watcher.recv().await {
                info!(path = %signal.path.display(), "reloading module");
                let result = registry.reload(&signal.path).await;
                if result.state == ModuleState::Failed {
                    warn!(module = %result.module_name, error = ?result.error, "module reload failed");
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatch_against_an_unloaded_registry_reports_unknown_command() {
        let dir = tempfile::TempDir::new().unwrap();
        let registry = CommandRegistry::new(dir.path(), Duration::from_millis(500), 0);
        let err = registry.dispatch("nope", Value::Null).await.unwrap_err();
        assert!(matches!(err, PluginError::UnknownCommand(name) if name == "nope"));
    }

    #[tokio::test]
    async fn loading_a_directory_with_no_modules_yields_no_results() {
        let dir = tempfile::TempDir::new().unwrap();
        let registry = CommandRegistry::new(dir.path(), Duration::from_millis(500), 0);
        let results = registry.load_all().await;
        assert!(results.is_empty());
        assert!(registry.list_commands().await.is_empty());
    }
}
