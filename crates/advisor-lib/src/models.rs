//! Core data models for the policy advisor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Job status tokens used by the scheduling lifecycle.
///
/// The job store accepts any status string; these are the ones the
/// orchestrator produces.
pub mod status {
    pub const SCHEDULED: &str = "scheduled";
    pub const RUNNING: &str = "running";
    pub const SUCCEEDED: &str = "succeeded";
    pub const FAILED: &str = "failed";

    /// Returns true for statuses that end the lifecycle
    pub fn is_terminal(status: &str) -> bool {
        matches!(status, SUCCEEDED | FAILED)
    }
}

/// A single recorded run of a policy with its observed KPIs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRun {
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub workload_label: Option<String>,
    #[serde(default)]
    pub kpis: BTreeMap<String, f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A named scheduling policy with guardrails and KPI history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub target_workloads: Vec<String>,
    #[serde(default)]
    pub guardrails: Vec<String>,
    /// Empty when the policy has no embedding
    #[serde(default, deserialize_with = "null_as_default")]
    pub embedding: Vec<f64>,
    #[serde(default)]
    pub kpis: BTreeMap<String, f64>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default = "Utc::now", with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub last_verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_activation_token: Option<String>,
    #[serde(default)]
    pub history: Vec<PolicyRun>,
}

impl PolicyRecord {
    /// Create a fresh record with both timestamps set to `now`
    pub fn new(id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            intent: String::new(),
            target_workloads: Vec::new(),
            guardrails: Vec::new(),
            embedding: Vec::new(),
            kpis: BTreeMap::new(),
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
            last_verified_at: None,
            last_activation_token: None,
            history: Vec::new(),
        }
    }

    pub fn embedding(&self) -> Option<&[f64]> {
        if self.embedding.is_empty() {
            None
        } else {
            Some(&self.embedding)
        }
    }

    pub fn is_verified(&self) -> bool {
        self.last_verified_at.is_some()
    }
}

/// One job's lifecycle record. Re-recording a job id replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub job_id: String,
    #[serde(default)]
    pub workload: String,
    #[serde(default)]
    pub policy_id: Option<String>,
    #[serde(default = "unknown_status")]
    pub status: String,
    #[serde(with = "timestamp")]
    pub submitted_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl JobRun {
    /// Timestamp of the latest lifecycle event
    pub fn effective_at(&self) -> DateTime<Utc> {
        self.finished_at
            .or(self.started_at)
            .unwrap_or(self.submitted_at)
    }
}

fn unknown_status() -> String {
    "unknown".to_string()
}

/// A container ranked by resource usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerUsage {
    pub name: String,
    pub instance: String,
    pub value: f64,
}

/// A cluster metric that crossed its hot threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentionSignal {
    pub metric: String,
    pub description: String,
    pub observed: f64,
    pub threshold: f64,
}

/// How often a policy governed recorded jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyUsage {
    pub policy_id: String,
    pub name: Option<String>,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub count: usize,
}

/// Job history aggregates embedded in a workload profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobHistoryDigest {
    pub total_runs: usize,
    pub status_counts: BTreeMap<String, usize>,
    pub recent: Vec<JobRun>,
    pub policy_usage: Vec<PolicyUsage>,
}

/// Point-in-time snapshot of cluster telemetry and job history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadProfile {
    pub window: String,
    pub generated_at: DateTime<Utc>,
    pub cluster_metrics: BTreeMap<String, f64>,
    pub top_cpu_containers: Vec<ContainerUsage>,
    pub top_network_containers: Vec<ContainerUsage>,
    pub contention: Vec<ContentionSignal>,
    pub job_history: JobHistoryDigest,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// ISO-8601 timestamps. Writes RFC 3339 in UTC; reads RFC 3339 or a naive
/// `YYYY-MM-DDTHH:MM:SS[.f]` value, which is taken to be UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => super::serialize(dt, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                None => Ok(None),
                Some(raw) if raw.trim().is_empty() => Ok(None),
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}"))),
            }
        }
    }
}
