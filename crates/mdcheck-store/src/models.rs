//! Persisted entities and their status enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// UTC timestamps are persisted and serialized as RFC 3339 with millisecond
/// precision.
pub mod ts_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn to_string(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_string(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => serializer.serialize_some(&super::to_string(ts)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            raw.map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
        }
    }
}

/// Lifecycle state of a validation record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Pending,
    Pass,
    Fail,
    Approved,
    Rejected,
    Enhanced,
}

/// Finding severity. Ordering matters: `error > warning > info`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    Pending,
    Approved,
    Rejected,
    Applied,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    ValidateDirectory,
    BatchEnhance,
    FullAudit,
    RecommendationBatch,
}

/// The persisted outcome of validating one file or content blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub id: String,
    pub file_path: String,
    pub status: ValidationStatus,
    pub severity: Severity,
    pub rules_applied: Vec<String>,
    pub validation_types: Vec<String>,
    pub validation_results: serde_json::Value,
    pub content: String,
    pub notes: String,
    #[serde(with = "ts_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "ts_millis")]
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a validation record; id and timestamps are assigned
/// by the store.
#[derive(Debug, Clone, Default)]
pub struct NewValidation {
    pub file_path: String,
    pub status: Option<ValidationStatus>,
    pub severity: Option<Severity>,
    pub rules_applied: Vec<String>,
    pub validation_types: Vec<String>,
    pub validation_results: serde_json::Value,
    pub content: String,
    pub notes: String,
}

/// A candidate textual edit with provenance and confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub validation_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub description: String,
    pub scope: String,
    pub instruction: String,
    pub rationale: String,
    pub severity: String,
    pub original_content: Option<String>,
    pub proposed_content: Option<String>,
    pub diff: Option<String>,
    pub confidence: f64,
    pub priority: i64,
    pub status: RecommendationStatus,
    pub reviewed_by: Option<String>,
    #[serde(with = "ts_millis::option")]
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    #[serde(with = "ts_millis::option")]
    pub applied_at: Option<DateTime<Utc>>,
    pub applied_by: Option<String>,
    pub metadata: serde_json::Value,
    #[serde(with = "ts_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "ts_millis")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewRecommendation {
    pub validation_id: String,
    pub kind: String,
    pub title: String,
    pub description: String,
    pub scope: String,
    pub instruction: String,
    pub rationale: String,
    pub severity: String,
    pub original_content: Option<String>,
    pub proposed_content: Option<String>,
    pub diff: Option<String>,
    pub confidence: f64,
    pub priority: i64,
    pub metadata: serde_json::Value,
}

/// A long-running multi-step operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub workflow_type: WorkflowType,
    pub state: WorkflowState,
    pub input_params: serde_json::Value,
    pub progress_percent: f64,
    pub current_step: i64,
    pub total_steps: i64,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
    #[serde(with = "ts_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "ts_millis")]
    pub updated_at: DateTime<Utc>,
    #[serde(with = "ts_millis::option")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub operation: String,
    pub user: Option<String>,
    pub status: String,
    pub details: serde_json::Value,
    #[serde(with = "ts_millis")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub id: String,
    pub operation: String,
    pub duration_ms: f64,
    pub status: String,
    #[serde(with = "ts_millis")]
    pub created_at: DateTime<Utc>,
}

/// Aggregated latency statistics for one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationStats {
    pub count: usize,
    pub avg_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub p50_duration_ms: f64,
    pub p95_duration_ms: f64,
    pub p99_duration_ms: f64,
}

/// Cache usage summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntryStats {
    pub total_items: usize,
    pub total_size_bytes: usize,
    pub by_type: std::collections::BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceFlag {
    pub enabled: bool,
    pub reason: Option<String>,
    pub enabled_by: Option<String>,
    #[serde(with = "ts_millis::option")]
    pub enabled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub name: String,
    pub metadata: serde_json::Value,
    #[serde(with = "ts_millis")]
    pub created_at: DateTime<Utc>,
}

impl Severity {
    /// Roll severities up across findings: the scan stops at the first
    /// `error`; `warning` only upgrades `info`.
    pub fn roll_up<I: IntoIterator<Item = Severity>>(findings: I) -> Severity {
        let mut result = Severity::Info;
        for severity in findings {
            match severity {
                Severity::Error => return Severity::Error,
                Severity::Warning => result = Severity::Warning,
                Severity::Info => {}
            }
        }
        result
    }
}
