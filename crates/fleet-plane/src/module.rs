use async_trait::async_trait;
use serde_json::Value;

use crate::error::PluginError;

/// One invocable operation a module exposes to the command plane.
#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str {
        ""
    }
    async fn run(&self, args: Value) -> Result<Value, PluginError>;
}

/// A loaded unit of extension code. A module is a `cdylib` built against
/// this crate's ABI; `fleet_plugin_entry` is its sole contract with the
/// host process.
pub trait CommandModule: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str {
        "0.0.0"
    }
    fn commands(&self) -> Vec<Box<dyn Command>>;
}

/// Signature every module's `cdylib` must export under the symbol name
/// `fleet_plugin_entry`. Not `extern "C"` — a fat `Box<dyn CommandModule>`
/// has no stable C ABI, so host and module must be built with the same
/// compiler version. That constraint is accepted in exchange for not
/// having to hand-roll a second, C-shaped vtable for every module.
pub type PluginEntryFn = unsafe fn() -> Box<dyn CommandModule>;

pub const ENTRY_SYMBOL: &[u8] = b"fleet_plugin_entry";

/// Lifecycle state of one discovered module, tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Discovered,
    Loading,
    Loaded,
    Reloading,
    Unloading,
    Gone,
    Failed,
}

#[derive(Debug)]
pub struct LoadResult {
    pub module_name: String,
    pub state: ModuleState,
    pub command_names: Vec<String>,
    pub error: Option<String>,
}

impl LoadResult {
    pub fn ok(module_name: impl Into<String>, command_names: Vec<String>) -> Self {
        Self {
            module_name: module_name.into(),
            state: ModuleState::Loaded,
            command_names,
            error: None,
        }
    }

    pub fn failed(module_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            state: ModuleState::Failed,
            command_names: Vec::new(),
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_result_carries_command_names_with_no_error() {
        let result = LoadResult::ok("widgets", vec!["spin".to_string(), "stop".to_string()]);
        assert_eq!(result.state, ModuleState::Loaded);
        assert_eq!(result.command_names, vec!["spin", "stop"]);
        assert!(result.error.is_none());
    }

    #[test]
    fn failed_result_carries_no_commands() {
        let result = LoadResult::failed("widgets", "symbol not found");
        assert_eq!(result.state, ModuleState::Failed);
        assert!(result.command_names.is_empty());
        assert_eq!(result.error.as_deref(), Some("symbol not found"));
    }
}
