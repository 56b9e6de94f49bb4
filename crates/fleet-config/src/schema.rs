use serde::{Deserialize, Serialize};

/// Top-level, typed configuration schema. Every field here is recognized;
/// unknown nested keys under a recognized section fail validation
/// (enforced by `resolver::validate`), unknown top-level keys are ignored
/// with a warning (enforced by the YAML layering step).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub environment: String,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub secrets: SecretsConfig,
    pub plugins: PluginConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            secrets: SecretsConfig::default(),
            plugins: PluginConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub echo: bool,
    pub pool_size: u32,
    pub max_overflow: u32,
    pub pool_timeout_secs: u64,
    pub pool_recycle_secs: u64,
    pub pool_pre_ping: bool,
    pub ssl_mode: Option<String>,
    pub ssl_root_cert: Option<String>,
    pub statement_timeout_secs: Option<u64>,
    pub health_check_interval_secs: u64,
    pub health_check_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub enable_failover: bool,
    pub failover_urls: Vec<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            echo: false,
            pool_size: 10,
            max_overflow: 20,
            pool_timeout_secs: 30,
            pool_recycle_secs: 3600,
            pool_pre_ping: true,
            ssl_mode: None,
            ssl_root_cert: None,
            statement_timeout_secs: None,
            health_check_interval_secs: 30,
            health_check_timeout_secs: 5,
            max_retries: 3,
            retry_delay_secs: 1,
            enable_failover: false,
            failover_urls: Vec::new(),
        }
    }
}

impl DatabaseConfig {
    /// Returns the offending field paths (prefixed `database.`), if any.
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.pool_size == 0 {
            errors.push("database.pool_size".to_string());
        }
        if self.pool_timeout_secs == 0 {
            errors.push("database.pool_timeout_secs".to_string());
        }
        if self.pool_recycle_secs == 0 {
            errors.push("database.pool_recycle_secs".to_string());
        }
        if self.health_check_interval_secs == 0 {
            errors.push("database.health_check_interval_secs".to_string());
        }
        if self.health_check_timeout_secs == 0 {
            errors.push("database.health_check_timeout_secs".to_string());
        }
        if self.retry_delay_secs == 0 {
            errors.push("database.retry_delay_secs".to_string());
        }
        errors
    }

    pub fn is_embedded(&self) -> bool {
        self.url.starts_with("sqlite:")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Console,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub debug_sampling_rate: f64,
    pub correlation_id_header: String,
    pub error_sink_dsn: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            debug_sampling_rate: 0.05,
            correlation_id_header: "X-Correlation-ID".to_string(),
            error_sink_dsn: None,
        }
    }
}

impl LoggingConfig {
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !(0.0..=1.0).contains(&self.debug_sampling_rate) {
            errors.push("logging.debug_sampling_rate".to_string());
        }
        errors
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    pub region: String,
    pub secret_name: String,
    pub auto_rotation_days: u32,
    pub encryption_key_name: String,
    pub kms_key_id: Option<String>,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            region: "local".to_string(),
            secret_name: "fleet/secrets".to_string(),
            auto_rotation_days: 30,
            encryption_key_name: "fleet/encryption-key".to_string(),
            kms_key_id: None,
        }
    }
}

impl SecretsConfig {
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.auto_rotation_days == 0 {
            errors.push("secrets.auto_rotation_days".to_string());
        }
        errors
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub directory: String,
    pub auto_reload: bool,
    pub reload_delay_secs: f64,
    pub max_load_retries: u32,
    pub load_timeout_secs: u64,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            directory: "plugins".to_string(),
            auto_reload: true,
            reload_delay_secs: 1.0,
            max_load_retries: 3,
            load_timeout_secs: 30,
        }
    }
}

impl PluginConfig {
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.reload_delay_secs <= 0.0 {
            errors.push("plugins.reload_delay_secs".to_string());
        }
        if self.max_load_retries == 0 {
            errors.push("plugins.max_load_retries".to_string());
        }
        if self.load_timeout_secs == 0 {
            errors.push("plugins.load_timeout_secs".to_string());
        }
        errors
    }
}

impl AppConfig {
    /// Aggregates every offending path across all sections, per spec.md's
    /// "typed validation error listing every offending path".
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.database.validation_errors());
        errors.extend(self.logging.validation_errors());
        errors.extend(self.secrets.validation_errors());
        errors.extend(self.plugins.validation_errors());
        errors
    }
}
