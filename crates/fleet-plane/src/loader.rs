use std::path::{Path, PathBuf};
use std::time::Duration;

use libloading::{Library, Symbol};
use tracing::{error, info, warn};

use crate::error::PluginError;
use crate::module::{CommandModule, LoadResult, PluginEntryFn, ENTRY_SYMBOL};

/// A module kept alive alongside the `Library` it was loaded from — the
/// library must outlive every trait object vended from it, so the two
/// travel together everywhere the loaded module goes.
pub struct LoadedModule {
    pub module: Box<dyn CommandModule>,
    _library: Library,
}

/// Discovers and loads `cdylib` modules from a directory, isolating
/// failures so one broken module never blocks the others from loading.
pub struct ModuleLoader {
    directory: PathBuf,
    load_timeout: Duration,
    max_retries: u32,
}

impl ModuleLoader {
    pub fn new(directory: impl Into<PathBuf>, load_timeout: Duration, max_retries: u32) -> Self {
        Self {
            directory: directory.into(),
            load_timeout,
            max_retries,
        }
    }

    /// Lists candidate module files (platform shared-library extension)
    /// without loading them.
    pub fn discover(&self) -> Result<Vec<PathBuf>, PluginError> {
        if !self.directory.exists() {
            return Ok(Vec::new());
        }
        let ext = std::env::consts::DLL_EXTENSION;
        let mut found = Vec::new();
        for entry in std::fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(ext) {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }

    /// Loads one module with a timeout and up to `max_retries` attempts.
    /// `dlopen`/symbol lookup run on a blocking thread since they're
    /// synchronous FFI calls with no cancellation point of their own.
    pub async fn load_one(&self, path: &Path) -> (LoadResult, Option<LoadedModule>) {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            let path = path.to_path_buf();
            let outcome = tokio::time::timeout(
                self.load_timeout,
                tokio::task::spawn_blocking(move || load_library(&path)),
            )
            .await;

            match outcome {
                Ok(Ok(Ok(loaded))) => {
                    let command_names = loaded.module.commands().iter().map(|c| c.name().to_string()).collect();
                    info!(module = %name, attempt, "module loaded");
                    return (LoadResult::ok(loaded.module.name().to_string(), command_names), Some(loaded));
                }
                Ok(Ok(Err(e))) => {
                    last_error = e.to_string();
                    warn!(module = %name, attempt, error = %last_error, "module load failed");
                }
                Ok(Err(join_err)) => {
                    last_error = format!("loader task panicked: {join_err}");
                    error!(module = %name, attempt, error = %last_error, "module load panicked");
                }
                Err(_) => {
                    last_error = format!("timed out after {}ms", self.load_timeout.as_millis());
                    warn!(module = %name, attempt, "module load timed out");
                }
            }
        }

        (LoadResult::failed(name, last_error), None)
    }

    /// Loads every discovered module, collecting a result per module
    /// regardless of individual failures.
    pub async fn load_all(&self) -> Vec<(LoadResult, Option<LoadedModule>)> {
        let mut out = Vec::new();
        match self.discover() {
            Ok(paths) => {
                for path in paths {
                    out.push(self.load_one(&path).await);
                }
            }
            Err(e) => {
                out.push((LoadResult::failed("<discovery>", e.to_string()), None));
            }
        }
        out
    }
}

fn load_library(path: &Path) -> Result<LoadedModule, PluginError> {
    // Safety: we trust modules placed in the configured plugin directory
    // to be built against this crate's ABI. `dlopen` runs the library's
    // static initializers, and the entry symbol call runs module code —
    // neither can be sandboxed by the loader itself.
    unsafe {
        let library = Library::new(path).map_err(|e| PluginError::Open {
            path: path.display().to_string(),
            source: e,
        })?;

        let entry: Symbol<PluginEntryFn> =
            library
                .get(ENTRY_SYMBOL)
                .map_err(|e| PluginError::MissingEntrySymbol {
                    path: path.display().to_string(),
                    source: e,
                })?;

        let module = entry();
        Ok(LoadedModule {
            module,
            _library: library,
        })
    }
}
