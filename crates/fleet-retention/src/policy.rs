use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionType {
    TelemetryRaw,
    TelemetryAggregated,
    Analytics,
    AuditLog,
    Alert,
}

impl RetentionType {
    /// Built-in default horizon, used when a [`RetentionPolicy`] doesn't
    /// override it explicitly.
    pub fn default_retention_days(&self) -> u32 {
        match self {
            RetentionType::TelemetryRaw => 30,
            RetentionType::TelemetryAggregated => 365,
            RetentionType::Analytics => 730,
            RetentionType::AuditLog => 365,
            RetentionType::Alert => 180,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    Json,
    JsonGz,
    Csv,
    CsvGz,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub data_type: RetentionType,
    pub retention_days: u32,
    pub archive_before_delete: bool,
    pub archive_format: ArchiveFormat,
    pub archive_directory: String,
}

impl RetentionPolicy {
    pub fn new(data_type: RetentionType) -> Self {
        Self {
            retention_days: data_type.default_retention_days(),
            data_type,
            archive_before_delete: true,
            archive_format: ArchiveFormat::JsonGz,
            archive_directory: "archives".to_string(),
        }
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }
}
