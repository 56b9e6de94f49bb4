use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("yaml parse error in {path}: {source}")]
    YamlParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("configuration invalid: {}", .paths.join(", "))]
    Validation { paths: Vec<String> },

    #[error("layering error: {0}")]
    Layering(#[from] config::ConfigError),
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("no cached fallback available for secret '{0}'")]
    NoFallback(String),

    #[error("secret '{0}' not found")]
    NotFound(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
