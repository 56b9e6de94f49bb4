use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::schema::AppConfig;
use crate::secrets::SecretVault;

/// Loads and layers configuration for the control plane.
///
/// Precedence, lowest to highest:
/// 1. Built-in defaults (`AppConfig::default()`)
/// 2. `<config_dir>/default.yaml`
/// 3. `<config_dir>/<environment>.yaml`
/// 4. Environment variables prefixed `FLEET__`, nested with `__`
///    (e.g. `FLEET__DATABASE__POOL_SIZE=20`)
/// 5. Secrets pulled from the configured `SecretVault`, merged last
pub struct ConfigResolver {
    config_dir: PathBuf,
    environment: String,
}

impl ConfigResolver {
    pub fn new(config_dir: impl Into<PathBuf>, environment: impl Into<String>) -> Self {
        Self {
            config_dir: config_dir.into(),
            environment: environment.into(),
        }
    }

    /// Builds the layered, validated configuration. Does not touch secrets;
    /// call `load_with_secrets` to also merge vault-backed values.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let defaults_path = self.config_dir.join("default.yaml");
        let env_path = self.config_dir.join(format!("{}.yaml", self.environment));

        let mut builder = Config::builder()
            .add_source(Config::try_from(&AppConfig::default()).map_err(ConfigError::Layering)?);

        if defaults_path.exists() {
            debug!(path = %defaults_path.display(), "layering default.yaml");
            builder = builder.add_source(File::new(
                defaults_path.to_string_lossy().as_ref(),
                FileFormat::Yaml,
            ));
        }

        if env_path.exists() {
            debug!(path = %env_path.display(), "layering environment overlay");
            builder = builder.add_source(File::new(
                env_path.to_string_lossy().as_ref(),
                FileFormat::Yaml,
            ));
        } else {
            warn!(environment = %self.environment, "no environment-specific overlay found");
        }

        builder = builder.add_source(
            Environment::with_prefix("FLEET")
                .separator("__")
                .try_parsing(true),
        );

        let layered = builder.build().map_err(ConfigError::Layering)?;
        let mut app: AppConfig = layered.try_deserialize().map_err(ConfigError::Layering)?;
        app.environment = self.environment.clone();

        self.validate(&app)?;
        Ok(app)
    }

    /// Loads the layered config, then merges in any secrets the vault
    /// holds under well-known keys (`database.url`, etc). Vault values win
    /// over every file/env layer, per the five-layer precedence.
    pub async fn load_with_secrets(
        &self,
        vault: &dyn SecretVault,
    ) -> Result<AppConfig, ConfigError> {
        let mut app = self.load()?;

        if let Ok(url) = vault.get_secret("database.url").await {
            app.database.url = url;
        }
        if let Ok(dsn) = vault.get_secret("logging.error_sink_dsn").await {
            app.logging.error_sink_dsn = Some(dsn);
        }

        self.validate(&app)?;
        info!(environment = %app.environment, "configuration resolved");
        Ok(app)
    }

    fn validate(&self, app: &AppConfig) -> Result<(), ConfigError> {
        let paths = app.validation_errors();
        if paths.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation { paths })
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn layers_default_then_environment_overlay() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.yaml"),
            "database:\n  pool_size: 5\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("production.yaml"),
            "database:\n  pool_size: 50\n",
        )
        .unwrap();

        let resolver = ConfigResolver::new(dir.path(), "production");
        let app = resolver.load().unwrap();
        assert_eq!(app.database.pool_size, 50);
        assert_eq!(app.environment, "production");
    }

    #[test]
    fn falls_back_to_defaults_with_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ConfigResolver::new(dir.path(), "development");
        let app = resolver.load().unwrap();
        assert_eq!(app.database.pool_size, AppConfig::default().database.pool_size);
    }

    #[test]
    fn env_vars_outrank_yaml_layers() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.yaml"),
            "database:\n  pool_size: 5\n",
        )
        .unwrap();
        std::env::set_var("FLEET__DATABASE__POOL_SIZE", "77");
        let resolver = ConfigResolver::new(dir.path(), "development");
        let app = resolver.load().unwrap();
        std::env::remove_var("FLEET__DATABASE__POOL_SIZE");
        assert_eq!(app.database.pool_size, 77);
    }

    #[test]
    fn invalid_values_report_every_offending_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.yaml"),
            "database:\n  pool_size: 0\n  pool_timeout_secs: 0\n",
        )
        .unwrap();
        let resolver = ConfigResolver::new(dir.path(), "development");
        let err = resolver.load().unwrap_err();
        match err {
            ConfigError::Validation { paths } => {
                assert!(paths.contains(&"database.pool_size".to_string()));
                assert!(paths.contains(&"database.pool_timeout_secs".to_string()));
            }
            other => panic!("expected Validation error, got {other:?}"),
        }
    }
}
