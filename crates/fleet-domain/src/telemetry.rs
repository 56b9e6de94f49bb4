use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DomainError, DomainResult};
use crate::ids::{DeviceId, TelemetryEventId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryEventType {
    SensorData,
    SystemMetrics,
    Performance,
    HealthCheck,
    ErrorLog,
    EventLog,
    Configuration,
    Diagnostic,
    Alert,
    Custom,
}

impl std::fmt::Display for TelemetryEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TelemetryEventType::SensorData => "sensor_data",
            TelemetryEventType::SystemMetrics => "system_metrics",
            TelemetryEventType::Performance => "performance",
            TelemetryEventType::HealthCheck => "health_check",
            TelemetryEventType::ErrorLog => "error_log",
            TelemetryEventType::EventLog => "event_log",
            TelemetryEventType::Configuration => "configuration",
            TelemetryEventType::Diagnostic => "diagnostic",
            TelemetryEventType::Alert => "alert",
            TelemetryEventType::Custom => "custom",
        };
        write!(f, "{s}")
    }
}

/// The primary value carried by an event — exactly one of numeric/string/boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryValue {
    Numeric(f64),
    Text(String),
    Boolean(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub id: TelemetryEventId,
    pub device_id: DeviceId,

    pub event_type: TelemetryEventType,
    pub event_name: String,
    pub source: Option<String>,

    pub occurred_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,

    pub value: Option<TelemetryValue>,
    pub payload: Value,
    pub units: Option<String>,

    pub quality: Option<f64>,
    pub confidence: Option<f64>,

    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub processing_duration_ms: Option<u64>,

    pub correlation_id: Option<String>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,

    pub sequence_number: Option<u64>,
    pub batch_id: Option<String>,

    pub tags: Vec<String>,

    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TelemetryEvent {
    pub fn new(device_id: DeviceId, event_type: TelemetryEventType, event_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TelemetryEventId::new(),
            device_id,
            event_type,
            event_name: event_name.into(),
            source: None,
            occurred_at: now,
            received_at: now,
            value: None,
            payload: Value::Object(Default::default()),
            units: None,
            quality: None,
            confidence: None,
            processed: false,
            processed_at: None,
            processing_duration_ms: None,
            correlation_id: None,
            trace_id: None,
            span_id: None,
            sequence_number: None,
            batch_id: None,
            tags: Vec::new(),
            metadata: Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
            deleted: false,
            deleted_at: None,
        }
    }

    /// §8.4: `0 ≤ quality ≤ 1 ∧ 0 ≤ confidence ≤ 1 ∧ processing_duration_ms ≥ 0` whenever set.
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(q) = self.quality {
            if !(0.0..=1.0).contains(&q) {
                return Err(DomainError::OutOfRange {
                    field: "quality",
                    message: format!("{q} not in [0, 1]"),
                });
            }
        }
        if let Some(c) = self.confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(DomainError::OutOfRange {
                    field: "confidence",
                    message: format!("{c} not in [0, 1]"),
                });
            }
        }
        // processing_duration_ms is u64 so it is non-negative by construction.
        Ok(())
    }

    pub fn numeric_value(&self) -> Option<f64> {
        match &self.value {
            Some(TelemetryValue::Numeric(n)) => Some(*n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_confidence_out_of_range() {
        let mut e = TelemetryEvent::new(DeviceId::new(), TelemetryEventType::SensorData, "temp");
        e.confidence = Some(1.5);
        assert!(e.validate().is_err());
    }
}
