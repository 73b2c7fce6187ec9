//! Workload profiling
//!
//! Combines cluster telemetry with job-store aggregates into a
//! [`WorkloadProfile`]. Non-finite telemetry values carry no signal: they
//! never reach the metric maps and are never compared against thresholds.

use crate::error::AdvisorResult;
use crate::models::{
    ContainerUsage, ContentionSignal, JobHistoryDigest, PolicyUsage, WorkloadProfile,
};
use crate::store::{JobStore, PolicyStore};
use crate::telemetry::{finite_mean, Sample, TelemetryGateway, TelemetryQuery};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub const CPU_PCT: &str = "cpu_pct";
pub const MEM_USED_PCT: &str = "mem_used_pct";
pub const LOAD1: &str = "load1";
pub const DISK_USED_PCT: &str = "disk_used_pct";

/// Thresholds and limits for profile construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilerConfig {
    #[serde(default = "default_cpu_hot_pct")]
    pub cpu_hot_pct: f64,
    #[serde(default = "default_mem_hot_pct")]
    pub mem_hot_pct: f64,
    #[serde(default = "default_disk_hot_pct")]
    pub disk_hot_pct: f64,
    /// Number of recent jobs included in the digest
    #[serde(default = "default_recent_jobs")]
    pub recent_jobs: usize,
}

fn default_cpu_hot_pct() -> f64 {
    80.0
}

fn default_mem_hot_pct() -> f64 {
    80.0
}

fn default_disk_hot_pct() -> f64 {
    85.0
}

fn default_recent_jobs() -> usize {
    10
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            cpu_hot_pct: default_cpu_hot_pct(),
            mem_hot_pct: default_mem_hot_pct(),
            disk_hot_pct: default_disk_hot_pct(),
            recent_jobs: default_recent_jobs(),
        }
    }
}

/// What to profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRequest {
    #[serde(default = "default_window")]
    pub window: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_include_network")]
    pub include_network: bool,
}

pub fn default_window() -> String {
    "15m".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_include_network() -> bool {
    true
}

impl Default for ProfileRequest {
    fn default() -> Self {
        Self {
            window: default_window(),
            top_k: default_top_k(),
            include_network: default_include_network(),
        }
    }
}

impl ProfileRequest {
    pub fn for_window(window: impl Into<String>) -> Self {
        Self {
            window: window.into(),
            ..Self::default()
        }
    }
}

/// Builds workload profiles from telemetry and the stores
pub struct WorkloadProfiler {
    gateway: Arc<dyn TelemetryGateway>,
    jobs: Arc<JobStore>,
    policies: Arc<PolicyStore>,
    config: ProfilerConfig,
}

impl WorkloadProfiler {
    pub fn new(
        gateway: Arc<dyn TelemetryGateway>,
        jobs: Arc<JobStore>,
        policies: Arc<PolicyStore>,
        config: ProfilerConfig,
    ) -> Self {
        Self {
            gateway,
            jobs,
            policies,
            config,
        }
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<dyn TelemetryGateway> {
        &self.gateway
    }

    /// Build a profile. Any telemetry failure aborts with
    /// [`crate::AdvisorError::UpstreamUnavailable`].
    pub async fn build(&self, request: &ProfileRequest) -> AdvisorResult<WorkloadProfile> {
        let window = Some(request.window.as_str());
        let k = request.top_k;

        let (cpu, mem, load, disk, top_cpu) = tokio::try_join!(
            self.gateway.query(TelemetryQuery::ClusterCpuPct, window),
            self.gateway.query(TelemetryQuery::ClusterMemUsedPct, window),
            self.gateway.query(TelemetryQuery::ClusterLoad1, window),
            self.gateway.query(TelemetryQuery::ClusterDiskUsedPct, window),
            self.gateway.query(TelemetryQuery::TopContainersCpu { k }, window),
        )?;
        let top_network = if request.include_network {
            self.gateway
                .query(TelemetryQuery::TopContainersNetwork { k }, window)
                .await?
        } else {
            Vec::new()
        };

        let mut cluster_metrics = BTreeMap::new();
        for (name, samples) in [
            (CPU_PCT, &cpu),
            (MEM_USED_PCT, &mem),
            (LOAD1, &load),
            (DISK_USED_PCT, &disk),
        ] {
            if let Some(value) = finite_mean(samples) {
                cluster_metrics.insert(name.to_string(), value);
            }
        }

        let contention = self.contention_signals(&cluster_metrics);
        let job_history = self.job_history().await;

        debug!(
            window = %request.window,
            metrics = cluster_metrics.len(),
            contention = contention.len(),
            "Workload profile built"
        );

        Ok(WorkloadProfile {
            window: request.window.clone(),
            generated_at: Utc::now(),
            cluster_metrics,
            top_cpu_containers: rank_containers(&top_cpu, k),
            top_network_containers: rank_containers(&top_network, k),
            contention,
            job_history,
        })
    }

    /// Signals for percentage metrics at or above their hot threshold
    pub fn contention_signals(&self, metrics: &BTreeMap<String, f64>) -> Vec<ContentionSignal> {
        [
            (CPU_PCT, self.config.cpu_hot_pct, "CPU utilization is high"),
            (MEM_USED_PCT, self.config.mem_hot_pct, "Memory pressure is high"),
            (DISK_USED_PCT, self.config.disk_hot_pct, "Disk usage is high"),
        ]
        .into_iter()
        .filter_map(|(metric, threshold, description)| {
            let observed = *metrics.get(metric)?;
            (observed.is_finite() && observed >= threshold).then(|| ContentionSignal {
                metric: metric.to_string(),
                description: description.to_string(),
                observed: round2(observed),
                threshold,
            })
        })
        .collect()
    }

    /// Job-store aggregates with policy names resolved
    pub async fn job_history(&self) -> JobHistoryDigest {
        let total_runs = self.jobs.len().await;
        let status_counts = self.jobs.status_counts().await;
        let recent = self.jobs.recent(self.config.recent_jobs).await;

        let mut policy_usage = Vec::new();
        for (policy_id, count) in self.jobs.policy_usage().await {
            let policy = self.policies.get(&policy_id).await;
            policy_usage.push(PolicyUsage {
                name: policy.as_ref().map(|p| p.name.clone()),
                last_verified_at: policy.and_then(|p| p.last_verified_at),
                policy_id,
                count,
            });
        }
        policy_usage.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.policy_id.cmp(&b.policy_id)));

        JobHistoryDigest {
            total_runs,
            status_counts,
            recent,
            policy_usage,
        }
    }
}

/// Finite samples as named containers, highest value first, at most `k`
pub fn rank_containers(samples: &[Sample], k: usize) -> Vec<ContainerUsage> {
    let mut ranked: Vec<ContainerUsage> = samples
        .iter()
        .filter(|s| s.value.is_finite())
        .map(|s| ContainerUsage {
            name: s.container_name(),
            instance: s.instance().to_string(),
            value: s.value,
        })
        .collect();
    ranked.sort_by(|a, b| b.value.total_cmp(&a.value));
    ranked.truncate(k);
    ranked
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
