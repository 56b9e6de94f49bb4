use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("repository error: {0}")]
    Repository(#[from] fleet_store::RepositoryError),

    #[error("archive write failed: {0}")]
    ArchiveWrite(String),

    #[error("archive verify failed: {path} ({reason})")]
    ArchiveVerify { path: String, reason: String },

    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}
