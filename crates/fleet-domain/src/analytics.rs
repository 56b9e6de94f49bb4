use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DomainError, DomainResult};
use crate::ids::{AnalyticsId, DeviceGroupId, DeviceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Median,
    P95,
    P99,
    Stddev,
    Variance,
    Rate,
    Throughput,
    Latency,
    ErrorRate,
    Availability,
    Uptime,
    Downtime,
}

impl std::fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AggregationKind::Count => "count",
            AggregationKind::Sum => "sum",
            AggregationKind::Avg => "avg",
            AggregationKind::Min => "min",
            AggregationKind::Max => "max",
            AggregationKind::Median => "median",
            AggregationKind::P95 => "p95",
            AggregationKind::P99 => "p99",
            AggregationKind::Stddev => "stddev",
            AggregationKind::Variance => "variance",
            AggregationKind::Rate => "rate",
            AggregationKind::Throughput => "throughput",
            AggregationKind::Latency => "latency",
            AggregationKind::ErrorRate => "error_rate",
            AggregationKind::Availability => "availability",
            AggregationKind::Uptime => "uptime",
            AggregationKind::Downtime => "downtime",
        };
        write!(f, "{s}")
    }
}

/// Scope an analytics row is computed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AnalyticsScope {
    Global,
    Device(DeviceId),
    Group(DeviceGroupId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalSummary {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub median: Option<f64>,
    pub stddev: Option<f64>,
    pub sample_count: u64,
}

impl Default for StatisticalSummary {
    fn default() -> Self {
        Self { min: None, max: None, avg: None, median: None, stddev: None, sample_count: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    pub id: AnalyticsId,
    pub analytics_type: String,
    pub metric_name: String,
    pub aggregation: AggregationKind,

    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub granularity: Option<String>,

    pub scope: AnalyticsScope,

    pub value: Option<f64>,
    pub count_value: Option<u64>,
    pub percentage_value: Option<f64>,

    pub summary: StatisticalSummary,

    pub units: Option<String>,
    pub confidence: Option<f64>,
    pub data_quality: Option<f64>,

    pub payload: Value,

    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Analytics {
    pub fn validate(&self) -> DomainResult<()> {
        if self.period_start > self.period_end {
            return Err(DomainError::Invalid {
                field: "period_start",
                message: "period_start must be <= period_end".into(),
            });
        }
        for (field, v) in [("confidence", self.confidence), ("data_quality", self.data_quality)] {
            if let Some(v) = v {
                if !(0.0..=1.0).contains(&v) {
                    return Err(DomainError::OutOfRange {
                        field,
                        message: format!("{v} not in [0, 1]"),
                    });
                }
            }
        }
        Ok(())
    }
}
