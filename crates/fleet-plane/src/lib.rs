//! The command plane: dynamic loading and hot-reload of operator-facing
//! command modules, plus the `fleetctl` binary built on top of it.

pub mod error;
pub mod loader;
pub mod module;
pub mod registry;
pub mod watcher;

pub use error::PluginError;
pub use loader::{LoadedModule, ModuleLoader};
pub use module::{Command, CommandModule, LoadResult, ModuleState, PluginEntryFn, ENTRY_SYMBOL};
pub use registry::CommandRegistry;
pub use watcher::{ModuleWatcher, ReloadSignal};
