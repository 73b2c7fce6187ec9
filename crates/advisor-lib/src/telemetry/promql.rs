//! Prometheus-backed telemetry gateway
//!
//! Renders each [`TelemetryQuery`] as PromQL and runs it as an instant query
//! against `/api/v1/query`.

use super::{Sample, TelemetryGateway, TelemetryQuery};
use crate::error::{AdvisorError, AdvisorResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Default request timeout for telemetry queries
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Window used when a query is issued without one
pub const DEFAULT_WINDOW: &str = "5m";

const CPU_BUSY_PCT: &str =
    r#"100 * (1 - avg by (instance) (rate(node_cpu_seconds_total{mode="idle"}[5m])))"#;
const FS_FILTER: &str = r#"fstype!~"tmpfs|overlay""#;

/// Builder for [`PrometheusGateway`]
pub struct PrometheusGatewayBuilder {
    base_url: String,
    timeout: Duration,
}

impl PrometheusGatewayBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> anyhow::Result<PrometheusGateway> {
        use anyhow::Context;

        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .context("Failed to create HTTP client")?;
        let base_url = Url::parse(&self.base_url).context("Invalid Prometheus URL")?;
        let query_url = base_url
            .join("api/v1/query")
            .context("Invalid Prometheus query path")?;

        Ok(PrometheusGateway { client, query_url })
    }
}

/// Telemetry gateway that queries a Prometheus server over HTTP
pub struct PrometheusGateway {
    client: Client,
    query_url: Url,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<VectorEntry>,
}

#[derive(Debug, Deserialize)]
struct VectorEntry {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    value: (serde_json::Value, serde_json::Value),
}

impl PrometheusGateway {
    pub fn builder(base_url: impl Into<String>) -> PrometheusGatewayBuilder {
        PrometheusGatewayBuilder::new(base_url)
    }

    /// PromQL text for a query descriptor
    pub fn render(query: TelemetryQuery, window: Option<&str>) -> String {
        let w = window.unwrap_or(DEFAULT_WINDOW);
        match query {
            TelemetryQuery::ClusterCpuPct => format!(
                r#"100 * (1 - avg(rate(node_cpu_seconds_total{{mode="idle"}}[{w}])))"#
            ),
            TelemetryQuery::ClusterMemUsedPct => format!(
                "avg(avg_over_time((100 * (1 - node_memory_MemAvailable_bytes / node_memory_MemTotal_bytes))[{w}:1m]))"
            ),
            TelemetryQuery::ClusterLoad1 => format!("avg(avg_over_time(node_load1[{w}]))"),
            TelemetryQuery::ClusterDiskUsedPct => format!(
                "max(avg_over_time((100 * (1 - node_filesystem_avail_bytes{{{FS_FILTER}}} / node_filesystem_size_bytes{{{FS_FILTER}}}))[{w}:1m]))"
            ),
            TelemetryQuery::TopContainersCpu { k } => format!(
                "topk({k}, sum by (container, id, instance) (rate(container_cpu_usage_seconds_total[{w}])))"
            ),
            TelemetryQuery::TopContainersNetwork { k } => format!(
                "topk({k}, sum by (container, id, instance) (rate(container_network_receive_bytes_total[{w}]) + rate(container_network_transmit_bytes_total[{w}])))"
            ),
            TelemetryQuery::InstanceCpuBusyPct => CPU_BUSY_PCT.to_string(),
            TelemetryQuery::InstanceMemAvailableBytes => "node_memory_MemAvailable_bytes".to_string(),
            TelemetryQuery::InstanceDiskFreeBytes => {
                format!("max by (instance) (node_filesystem_free_bytes{{{FS_FILTER}}})")
            }
            TelemetryQuery::InstanceCpuBusyP95 => {
                format!("quantile_over_time(0.95, ({CPU_BUSY_PCT})[1h:1m])")
            }
            TelemetryQuery::InstanceMemAvailableP05 => {
                "quantile_over_time(0.05, node_memory_MemAvailable_bytes[1h])".to_string()
            }
            TelemetryQuery::InstanceDiskFreeP05 => format!(
                "max by (instance) (quantile_over_time(0.05, node_filesystem_free_bytes{{{FS_FILTER}}}[1h]))"
            ),
        }
    }

    async fn instant_query(&self, promql: &str) -> AdvisorResult<Vec<Sample>> {
        let response = self
            .client
            .get(self.query_url.clone())
            .query(&[("query", promql)])
            .send()
            .await
            .map_err(|e| AdvisorError::UpstreamUnavailable(format!("Prometheus request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AdvisorError::UpstreamUnavailable(format!(
                "Prometheus error ({status}): {body}"
            )));
        }

        let body: QueryResponse = response.json().await.map_err(|e| {
            AdvisorError::UpstreamUnavailable(format!("Failed to parse Prometheus response: {e}"))
        })?;

        if body.status != "success" {
            return Err(AdvisorError::UpstreamUnavailable(format!(
                "Prometheus query failed: {}",
                body.error.unwrap_or(body.status)
            )));
        }

        let samples = body
            .data
            .map(|d| d.result)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| {
                let value = parse_value(&entry.value.1);
                if value.is_none() {
                    warn!(labels = ?entry.metric, "Skipping sample with unparseable value");
                }
                value.map(|v| Sample::new(entry.metric, v))
            })
            .collect();

        Ok(samples)
    }
}

/// Prometheus encodes sample values as strings, including `NaN` and `+Inf`
fn parse_value(raw: &serde_json::Value) -> Option<f64> {
    match raw {
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[async_trait]
impl TelemetryGateway for PrometheusGateway {
    async fn query(&self, query: TelemetryQuery, window: Option<&str>) -> AdvisorResult<Vec<Sample>> {
        let promql = Self::render(query, window);
        let start = Instant::now();
        let samples = self.instant_query(&promql).await?;
        debug!(
            query = ?query,
            samples = samples.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Telemetry query completed"
        );
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn gateway(server: &mockito::ServerGuard) -> PrometheusGateway {
        PrometheusGateway::builder(server.url())
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_query_parses_vector_result() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::UrlEncoded(
                "query".into(),
                "avg(avg_over_time(node_load1[15m]))".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"success","data":{"resultType":"vector","result":[
                    {"metric":{"instance":"node-1:9100"},"value":[1717000000.1,"1.25"]},
                    {"metric":{"instance":"node-2:9100"},"value":[1717000000.1,"NaN"]},
                    {"metric":{"instance":"node-3:9100"},"value":[1717000000.1,"oops"]}
                ]}}"#,
            )
            .create_async()
            .await;

        let samples = gateway(&server)
            .query(TelemetryQuery::ClusterLoad1, Some("15m"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].instance(), "node-1:9100");
        assert_eq!(samples[0].value, 1.25);
        assert!(samples[1].value.is_nan());
    }

    #[tokio::test]
    async fn test_http_error_is_upstream_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let result = gateway(&server)
            .query(TelemetryQuery::ClusterCpuPct, None)
            .await;
        assert!(matches!(result, Err(AdvisorError::UpstreamUnavailable(msg)) if msg.contains("503")));
    }

    #[tokio::test]
    async fn test_error_status_is_upstream_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#)
            .create_async()
            .await;

        let result = gateway(&server)
            .query(TelemetryQuery::ClusterCpuPct, None)
            .await;
        assert!(matches!(result, Err(AdvisorError::UpstreamUnavailable(msg)) if msg.contains("parse error")));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_upstream_unavailable() {
        let gateway = PrometheusGateway::builder("http://127.0.0.1:1")
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap();
        let result = gateway.query(TelemetryQuery::ClusterLoad1, None).await;
        assert!(matches!(result, Err(AdvisorError::UpstreamUnavailable(_))));
    }

    #[test]
    fn test_render_uses_window_and_k() {
        let cpu = PrometheusGateway::render(TelemetryQuery::ClusterCpuPct, Some("15m"));
        assert_eq!(
            cpu,
            r#"100 * (1 - avg(rate(node_cpu_seconds_total{mode="idle"}[15m])))"#
        );

        let top = PrometheusGateway::render(TelemetryQuery::TopContainersNetwork { k: 3 }, None);
        assert!(top.starts_with("topk(3, "));
        assert!(top.contains("[5m]"));

        let disk = PrometheusGateway::render(TelemetryQuery::InstanceDiskFreeBytes, None);
        assert_eq!(
            disk,
            r#"max by (instance) (node_filesystem_free_bytes{fstype!~"tmpfs|overlay"})"#
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(PrometheusGateway::builder("not a url").build().is_err());
    }
}
