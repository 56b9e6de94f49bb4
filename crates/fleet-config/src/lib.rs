//! Layered configuration resolution and encrypted secret storage for the
//! fleet control plane.

pub mod error;
pub mod resolver;
pub mod schema;
pub mod secrets;

pub use error::{ConfigError, SecretError};
pub use resolver::ConfigResolver;
pub use schema::{AppConfig, DatabaseConfig, LogFormat, LoggingConfig, LogLevel, PluginConfig, SecretsConfig};
pub use secrets::{vault_path, FileVault, NullVault, SecretVault};
