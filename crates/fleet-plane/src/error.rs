use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("failed to open module library at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: libloading::Error,
    },

    #[error("module at {path} has no `fleet_plugin_entry` symbol: {source}")]
    MissingEntrySymbol {
        path: String,
        #[source]
        source: libloading::Error,
    },

    #[error("module '{name}' load timed out after {timeout_ms}ms")]
    LoadTimeout { name: String, timeout_ms: u64 },

    #[error("module '{name}' panicked during load: {message}")]
    LoadPanicked { name: String, message: String },

    #[error("command '{0}' is not registered")]
    UnknownCommand(String),

    #[error("command '{command}' in module '{module}' failed: {message}")]
    CommandFailed {
        module: String,
        command: String,
        message: String,
    },

    #[error("filesystem watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
