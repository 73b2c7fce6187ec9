//! Telemetry gateway
//!
//! The profiler and the advice executor ask for telemetry through typed
//! [`TelemetryQuery`] descriptors. How a descriptor becomes a concrete query
//! is the gateway's business; [`PrometheusGateway`] renders PromQL.

mod promql;

pub use promql::{PrometheusGateway, PrometheusGatewayBuilder};

use crate::error::AdvisorResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label key carrying the instance identifier
pub const INSTANCE_LABEL: &str = "instance";

/// Named telemetry queries understood by every gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "query")]
pub enum TelemetryQuery {
    /// Cluster CPU utilization percent
    ClusterCpuPct,
    /// Cluster memory used percent
    ClusterMemUsedPct,
    /// Average 1-minute load
    ClusterLoad1,
    /// Cluster disk used percent
    ClusterDiskUsedPct,
    /// Top-k containers by CPU rate
    TopContainersCpu { k: usize },
    /// Top-k containers by network rx+tx rate
    TopContainersNetwork { k: usize },
    /// Per-instance CPU busy percent right now
    InstanceCpuBusyPct,
    /// Per-instance available memory bytes
    InstanceMemAvailableBytes,
    /// Per-instance free disk bytes
    InstanceDiskFreeBytes,
    /// Per-instance p95 CPU busy percent over the last hour
    InstanceCpuBusyP95,
    /// Per-instance p05 available memory over the last hour
    InstanceMemAvailableP05,
    /// Per-instance p05 free disk over the last hour
    InstanceDiskFreeP05,
}

/// One labelled value returned by a query. Values may be non-finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

impl Sample {
    pub fn new(labels: BTreeMap<String, String>, value: f64) -> Self {
        Self { labels, value }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn instance(&self) -> &str {
        self.label(INSTANCE_LABEL).unwrap_or("_")
    }

    /// Container display name: the `container` label, else the last path
    /// segment of `id` cut to 12 characters, else `unknown`
    pub fn container_name(&self) -> String {
        if let Some(container) = self.label("container").filter(|c| !c.is_empty()) {
            return container.to_string();
        }
        match self.label("id").filter(|id| !id.is_empty()) {
            Some(id) => id.rsplit('/').next().unwrap_or(id).chars().take(12).collect(),
            None => "unknown".to_string(),
        }
    }
}

/// Source of telemetry samples
#[async_trait]
pub trait TelemetryGateway: Send + Sync {
    /// Run a query over an optional window such as `15m`.
    ///
    /// Transport failures and non-success responses are
    /// [`crate::AdvisorError::UpstreamUnavailable`].
    async fn query(&self, query: TelemetryQuery, window: Option<&str>) -> AdvisorResult<Vec<Sample>>;
}

/// Collapse samples to instance → value, dropping non-finite values
pub fn scalar_map(samples: &[Sample]) -> BTreeMap<String, f64> {
    samples
        .iter()
        .filter(|s| s.value.is_finite())
        .map(|s| (s.instance().to_string(), s.value))
        .collect()
}

/// Mean of the finite values, `None` if there are none
pub fn finite_mean(samples: &[Sample]) -> Option<f64> {
    let values: Vec<f64> = samples
        .iter()
        .map(|s| s.value)
        .filter(|v| v.is_finite())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(labels: &[(&str, &str)], value: f64) -> Sample {
        Sample::new(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            value,
        )
    }

    #[test]
    fn test_container_name_prefers_label() {
        let s = sample(&[("container", "nginx"), ("id", "/docker/abcdef0123456789")], 1.0);
        assert_eq!(s.container_name(), "nginx");
    }

    #[test]
    fn test_container_name_falls_back_to_truncated_id() {
        let s = sample(&[("container", ""), ("id", "/system.slice/docker-abcdef0123456789.scope")], 1.0);
        assert_eq!(s.container_name(), "docker-abcde");

        let bare = sample(&[("id", "short")], 1.0);
        assert_eq!(bare.container_name(), "short");

        let none = sample(&[("instance", "node-1")], 1.0);
        assert_eq!(none.container_name(), "unknown");
    }

    #[test]
    fn test_scalar_map_skips_non_finite() {
        let samples = vec![
            sample(&[("instance", "a")], 1.5),
            sample(&[("instance", "b")], f64::NAN),
            sample(&[("instance", "c")], f64::INFINITY),
            sample(&[], 2.0),
        ];
        let map = scalar_map(&samples);
        assert_eq!(map.len(), 2);
        assert_eq!(map["a"], 1.5);
        assert_eq!(map["_"], 2.0);
    }

    #[test]
    fn test_finite_mean() {
        let samples = vec![
            sample(&[("instance", "a")], 10.0),
            sample(&[("instance", "b")], 30.0),
            sample(&[("instance", "c")], f64::NAN),
        ];
        assert_eq!(finite_mean(&samples), Some(20.0));
        assert_eq!(finite_mean(&[sample(&[], f64::NAN)]), None);
        assert_eq!(finite_mean(&[]), None);
    }
}
