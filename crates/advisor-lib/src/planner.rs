//! Structured planner requests
//!
//! A planning front-end turns free text into one [`PlanRequest`]; this module
//! executes it against live telemetry and returns facts rather than prose.

use crate::error::{AdvisorError, AdvisorResult};
use crate::models::{ContainerUsage, WorkloadProfile};
use crate::orchestrator::SchedulingOrchestrator;
use crate::profiler::{ProfileRequest, CPU_PCT, DISK_USED_PCT, LOAD1, MEM_USED_PCT};
use crate::telemetry::{scalar_map, TelemetryQuery};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Resource needs of a prospective job. Absent fields require nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    /// CPU headroom percent
    #[serde(default)]
    pub cpu_pct: f64,
    #[serde(default)]
    pub mem_bytes: f64,
    #[serde(default)]
    pub disk_free_bytes: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportFilters {
    /// Only rank containers on this instance
    #[serde(default)]
    pub instance: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    #[serde(default = "default_report_window")]
    pub window: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub filters: ReportFilters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityRequest {
    pub requirements: Requirements,
    #[serde(default = "default_duration")]
    pub duration: String,
    #[serde(default)]
    pub host: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestWindowRequest {
    pub requirements: Requirements,
    #[serde(default = "default_duration")]
    pub duration: String,
    #[serde(default = "default_horizon_hours")]
    pub horizon_hours: u32,
    #[serde(default)]
    pub host: Option<String>,
}

fn default_report_window() -> String {
    "1h".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_duration() -> String {
    "45m".to_string()
}

fn default_horizon_hours() -> u32 {
    24
}

/// A planner request, dispatched on `action`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlanRequest {
    Report(ReportRequest),
    #[serde(alias = "capacity_check")]
    CanRun(CapacityRequest),
    SuggestWindow(SuggestWindowRequest),
    Clarify { message: String },
}

/// Current headroom of one instance; `None` where telemetry had no value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headroom {
    pub cpu_pct: Option<f64>,
    pub mem_bytes: Option<f64>,
    pub disk_free_bytes: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityResult {
    pub instance: String,
    pub can_run_now: bool,
    pub reasons: Vec<String>,
    pub headroom_now: Headroom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedWindow {
    /// `now` or an RFC 3339 start time
    pub start: String,
    pub duration: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceWindows {
    pub instance: String,
    pub windows: Vec<SuggestedWindow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportFacts {
    pub window: String,
    pub top_k: usize,
    pub facts: Vec<String>,
    pub profile: WorkloadProfile,
}

/// Result of executing a [`PlanRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlanResponse {
    Report(ReportFacts),
    CanRun { results: Vec<CapacityResult> },
    SuggestWindow { results: Vec<InstanceWindows> },
    Clarify { message: String },
}

/// Daily low-traffic slot offered by window suggestions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffPeak {
    pub hour: u32,
    pub utc_offset_minutes: i32,
}

impl Default for OffPeak {
    fn default() -> Self {
        Self {
            hour: 1,
            utc_offset_minutes: 0,
        }
    }
}

impl OffPeak {
    /// The first off-peak start strictly after `now`, in the slot's offset
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(self.utc_offset_minutes.checked_mul(60)?)?;
        let local_now = now.with_timezone(&offset);
        let today = local_now
            .date_naive()
            .and_hms_opt(self.hour, 0, 0)?
            .and_local_timezone(offset)
            .single()?;
        if today > local_now {
            Some(today)
        } else {
            Some(today + Duration::days(1))
        }
    }
}

/// Executes planner requests against the orchestrator's telemetry
pub struct AdviceExecutor {
    orchestrator: Arc<SchedulingOrchestrator>,
    offpeak: OffPeak,
}

impl AdviceExecutor {
    pub fn new(orchestrator: Arc<SchedulingOrchestrator>, offpeak: OffPeak) -> Self {
        Self {
            orchestrator,
            offpeak,
        }
    }

    pub async fn execute(&self, request: PlanRequest) -> AdvisorResult<PlanResponse> {
        match request {
            PlanRequest::Report(report) => self.report(&report).await.map(PlanResponse::Report),
            PlanRequest::CanRun(capacity) => {
                let results = self.can_run(&capacity).await?;
                Ok(PlanResponse::CanRun { results })
            }
            PlanRequest::SuggestWindow(suggest) => {
                let results = self.suggest_window(&suggest, Utc::now()).await?;
                Ok(PlanResponse::SuggestWindow { results })
            }
            PlanRequest::Clarify { message } => Ok(PlanResponse::Clarify { message }),
        }
    }

    pub async fn report(&self, request: &ReportRequest) -> AdvisorResult<ReportFacts> {
        if request.top_k == 0 {
            return Err(AdvisorError::InvalidInput("top_k must be at least 1".to_string()));
        }
        let mut profile = self
            .orchestrator
            .profile(&ProfileRequest {
                window: request.window.clone(),
                top_k: request.top_k,
                include_network: true,
            })
            .await?;

        if let Some(instance) = request.filters.instance.as_deref() {
            profile.top_cpu_containers.retain(|c| c.instance == instance);
            profile.top_network_containers.retain(|c| c.instance == instance);
        }

        let facts = report_facts(&profile, request.top_k);
        Ok(ReportFacts {
            window: request.window.clone(),
            top_k: request.top_k,
            facts,
            profile,
        })
    }

    pub async fn can_run(&self, request: &CapacityRequest) -> AdvisorResult<Vec<CapacityResult>> {
        let gateway = self.orchestrator.profiler().gateway();
        let result = tokio::try_join!(
            gateway.query(TelemetryQuery::InstanceCpuBusyPct, None),
            gateway.query(TelemetryQuery::InstanceMemAvailableBytes, None),
            gateway.query(TelemetryQuery::InstanceDiskFreeBytes, None),
        );
        self.orchestrator.health().observe_telemetry(&result).await;
        let (cpu_busy, mem, disk) = result?;

        let cpu: BTreeMap<String, f64> = scalar_map(&cpu_busy)
            .into_iter()
            .map(|(instance, busy)| (instance, 100.0 - busy))
            .collect();
        let mem = scalar_map(&mem);
        let disk = scalar_map(&disk);
        let need = &request.requirements;

        let results = instances(request.host.as_deref(), [&cpu, &mem, &disk])
            .into_iter()
            .map(|instance| {
                let have_cpu = cpu.get(&instance).copied();
                let have_mem = mem.get(&instance).copied();
                let have_disk = disk.get(&instance).copied();

                let mut reasons = Vec::new();
                if have_cpu.unwrap_or(0.0) < need.cpu_pct {
                    reasons.push(format!(
                        "CPU headroom {:.1}% < need {}%",
                        have_cpu.unwrap_or(0.0),
                        need.cpu_pct
                    ));
                }
                if have_mem.unwrap_or(0.0) < need.mem_bytes {
                    reasons.push(format!(
                        "Mem free {} < need {}",
                        have_mem.unwrap_or(0.0) as u64,
                        need.mem_bytes as u64
                    ));
                }
                if have_disk.unwrap_or(0.0) < need.disk_free_bytes {
                    reasons.push(format!(
                        "Disk free {} < need {}",
                        have_disk.unwrap_or(0.0) as u64,
                        need.disk_free_bytes as u64
                    ));
                }

                CapacityResult {
                    can_run_now: reasons.is_empty(),
                    reasons,
                    headroom_now: Headroom {
                        cpu_pct: have_cpu,
                        mem_bytes: have_mem,
                        disk_free_bytes: have_disk,
                    },
                    instance,
                }
            })
            .collect();

        debug!(host = ?request.host, duration = %request.duration, "Capacity check completed");
        Ok(results)
    }

    /// Windows per instance: `now` when last hour's p95 CPU and p05
    /// memory/disk headroom cover the requirements, plus the next off-peak
    /// slot when it falls within the horizon
    pub async fn suggest_window(
        &self,
        request: &SuggestWindowRequest,
        now: DateTime<Utc>,
    ) -> AdvisorResult<Vec<InstanceWindows>> {
        let gateway = self.orchestrator.profiler().gateway();
        let result = tokio::try_join!(
            gateway.query(TelemetryQuery::InstanceCpuBusyP95, None),
            gateway.query(TelemetryQuery::InstanceMemAvailableP05, None),
            gateway.query(TelemetryQuery::InstanceDiskFreeP05, None),
        );
        self.orchestrator.health().observe_telemetry(&result).await;
        let (cpu_busy, mem, disk) = result?;

        let cpu: BTreeMap<String, f64> = scalar_map(&cpu_busy)
            .into_iter()
            .map(|(instance, busy)| (instance, (100.0 - busy).max(0.0)))
            .collect();
        let mem = scalar_map(&mem);
        let disk = scalar_map(&disk);
        let need = &request.requirements;

        let horizon = Duration::hours(i64::from(request.horizon_hours));
        let offpeak = self
            .offpeak
            .next_after(now)
            .filter(|start| start.with_timezone(&Utc) - now <= horizon);

        let results = instances(request.host.as_deref(), [&cpu, &mem, &disk])
            .into_iter()
            .map(|instance| {
                let mut windows = Vec::new();
                let fits = cpu.get(&instance).copied().unwrap_or(0.0) >= need.cpu_pct
                    && mem.get(&instance).copied().unwrap_or(0.0) >= need.mem_bytes
                    && disk.get(&instance).copied().unwrap_or(0.0) >= need.disk_free_bytes;
                if fits {
                    windows.push(SuggestedWindow {
                        start: "now".to_string(),
                        duration: request.duration.clone(),
                        reason: "p95 headroom sufficient".to_string(),
                    });
                }
                if let Some(start) = offpeak {
                    windows.push(SuggestedWindow {
                        start: start.to_rfc3339(),
                        duration: request.duration.clone(),
                        reason: format!("typical off-peak ({:02}:00 local)", self.offpeak.hour),
                    });
                }
                InstanceWindows { instance, windows }
            })
            .collect();

        Ok(results)
    }
}

/// The requested host alone, or every instance seen in any map
fn instances(host: Option<&str>, maps: [&BTreeMap<String, f64>; 3]) -> Vec<String> {
    match host {
        Some(host) => vec![host.to_string()],
        None => maps
            .iter()
            .flat_map(|m| m.keys().cloned())
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect(),
    }
}

fn report_facts(profile: &WorkloadProfile, top_k: usize) -> Vec<String> {
    let window = &profile.window;
    let mut facts = Vec::new();

    for (metric, label, unit) in [
        (CPU_PCT, "CPU utilization", "%"),
        (MEM_USED_PCT, "memory usage", "%"),
        (DISK_USED_PCT, "disk usage", "%"),
        (LOAD1, "1-minute load", ""),
    ] {
        match profile.cluster_metrics.get(metric) {
            Some(value) => facts.push(format!(
                "Average {label} over the last {window} was {value:.1}{unit}."
            )),
            None => facts.push(format!("No data for {label} over the last {window}.")),
        }
    }

    facts.push(format!(
        "Top {top_k} containers by CPU: {}.",
        container_list(&profile.top_cpu_containers)
    ));
    facts.push(format!(
        "Top {top_k} containers by network: {}.",
        container_list(&profile.top_network_containers)
    ));

    if profile.contention.is_empty() {
        facts.push("No contention signals.".to_string());
    }
    for signal in &profile.contention {
        facts.push(format!(
            "{}: {} at {} (threshold {}).",
            signal.description, signal.metric, signal.observed, signal.threshold
        ));
    }

    let history = &profile.job_history;
    if history.status_counts.is_empty() {
        facts.push("No recorded jobs.".to_string());
    } else {
        let counts: Vec<String> = history
            .status_counts
            .iter()
            .map(|(status, count)| format!("{status}={count}"))
            .collect();
        facts.push(format!(
            "{} recorded jobs: {}.",
            history.total_runs,
            counts.join(", ")
        ));
    }

    facts
}

fn container_list(containers: &[ContainerUsage]) -> String {
    if containers.is_empty() {
        return "none".to_string();
    }
    containers
        .iter()
        .map(|c| format!("{}={:.4}", c.name, c.value))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::testing::{sample, FakeGateway};
    use crate::profiler::{ProfilerConfig, WorkloadProfiler};
    use crate::store::{JobStore, PolicyStore};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn executor(dir: &TempDir, gateway: FakeGateway, offpeak: OffPeak) -> AdviceExecutor {
        let policies = Arc::new(PolicyStore::open(dir.path().join("policies.json"), None).unwrap());
        let jobs = Arc::new(JobStore::open(dir.path().join("jobs.json")).unwrap());
        let profiler = WorkloadProfiler::new(
            Arc::new(gateway),
            jobs.clone(),
            policies.clone(),
            ProfilerConfig::default(),
        );
        let orchestrator = Arc::new(SchedulingOrchestrator::new(policies, jobs, profiler));
        AdviceExecutor::new(orchestrator, offpeak)
    }

    fn two_nodes() -> FakeGateway {
        FakeGateway::default()
            .with(
                TelemetryQuery::InstanceCpuBusyPct,
                vec![
                    sample(&[("instance", "n1")], 30.0),
                    sample(&[("instance", "n2")], 90.0),
                ],
            )
            .with(
                TelemetryQuery::InstanceMemAvailableBytes,
                vec![
                    sample(&[("instance", "n1")], 8e9),
                    sample(&[("instance", "n2")], 1e9),
                ],
            )
            .with_scalar(TelemetryQuery::InstanceDiskFreeBytes, "n1", 5e10)
            .with(
                TelemetryQuery::InstanceCpuBusyP95,
                vec![
                    sample(&[("instance", "n1")], 50.0),
                    sample(&[("instance", "n2")], 120.0),
                ],
            )
            .with_scalar(TelemetryQuery::InstanceMemAvailableP05, "n1", 6e9)
            .with_scalar(TelemetryQuery::InstanceDiskFreeP05, "n1", 4e10)
    }

    fn requirements() -> Requirements {
        Requirements {
            cpu_pct: 40.0,
            mem_bytes: 4e9,
            disk_free_bytes: 2e10,
        }
    }

    #[test]
    fn test_plan_request_parsing() {
        let plan: PlanRequest = serde_json::from_str(r#"{"action":"report"}"#).unwrap();
        assert_eq!(
            plan,
            PlanRequest::Report(ReportRequest {
                window: "1h".to_string(),
                top_k: 5,
                filters: ReportFilters::default(),
            })
        );

        let plan: PlanRequest = serde_json::from_str(
            r#"{"action":"capacity_check","requirements":{"cpu_pct":40},"host":null}"#,
        )
        .unwrap();
        match plan {
            PlanRequest::CanRun(req) => {
                assert_eq!(req.duration, "45m");
                assert_eq!(req.requirements.cpu_pct, 40.0);
                assert_eq!(req.requirements.mem_bytes, 0.0);
                assert!(req.host.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }

        let plan: PlanRequest =
            serde_json::from_str(r#"{"action":"suggest_window","requirements":{}}"#).unwrap();
        assert!(matches!(plan, PlanRequest::SuggestWindow(SuggestWindowRequest { horizon_hours: 24, .. })));

        assert!(serde_json::from_str::<PlanRequest>(r#"{"action":"dance"}"#).is_err());
    }

    #[tokio::test]
    async fn test_clarify_is_echoed() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, FakeGateway::failing(), OffPeak::default());
        let response = exec
            .execute(PlanRequest::Clarify {
                message: "Which host?".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(
            response,
            PlanResponse::Clarify {
                message: "Which host?".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_can_run_per_instance() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, two_nodes(), OffPeak::default());
        let results = exec
            .can_run(&CapacityRequest {
                requirements: requirements(),
                duration: "45m".to_string(),
                host: None,
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].instance, "n1");
        assert!(results[0].can_run_now);
        assert_eq!(results[0].headroom_now.cpu_pct, Some(70.0));

        assert!(!results[1].can_run_now);
        assert_eq!(results[1].reasons.len(), 3);
        assert!(results[1].reasons[0].starts_with("CPU headroom 10.0%"));
        assert!(results[1].headroom_now.disk_free_bytes.is_none());
    }

    #[tokio::test]
    async fn test_can_run_unknown_host() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, two_nodes(), OffPeak::default());
        let results = exec
            .can_run(&CapacityRequest {
                requirements: Requirements::default(),
                duration: "10m".to_string(),
                host: Some("n9".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].instance, "n9");
        assert!(results[0].can_run_now);
    }

    #[tokio::test]
    async fn test_suggest_window_now_and_offpeak() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, two_nodes(), OffPeak::default());
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let request = SuggestWindowRequest {
            requirements: requirements(),
            duration: "45m".to_string(),
            horizon_hours: 24,
            host: None,
        };
        let results = exec.suggest_window(&request, now).await.unwrap();

        assert_eq!(results[0].instance, "n1");
        assert_eq!(results[0].windows.len(), 2);
        assert_eq!(results[0].windows[0].start, "now");
        assert_eq!(results[0].windows[1].start, "2024-06-02T01:00:00+00:00");

        assert_eq!(results[1].instance, "n2");
        assert_eq!(results[1].windows.len(), 1);

        let short = SuggestWindowRequest {
            horizon_hours: 6,
            ..request
        };
        let results = exec.suggest_window(&short, now).await.unwrap();
        assert_eq!(results[0].windows.len(), 1);
        assert!(results[1].windows.is_empty());
    }

    #[test]
    fn test_offpeak_respects_offset() {
        let chicago = OffPeak {
            hour: 1,
            utc_offset_minutes: -300,
        };
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).unwrap();
        let next = chicago.next_after(now).unwrap();
        assert_eq!(next.to_rfc3339(), "2024-06-01T01:00:00-05:00");

        let after = Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap();
        assert_eq!(
            chicago.next_after(after).unwrap().to_rfc3339(),
            "2024-06-02T01:00:00-05:00"
        );

        let invalid = OffPeak {
            hour: 25,
            utc_offset_minutes: 0,
        };
        assert!(invalid.next_after(now).is_none());
    }

    #[tokio::test]
    async fn test_report_facts_and_instance_filter() {
        let dir = TempDir::new().unwrap();
        let gateway = FakeGateway::default()
            .with_scalar(TelemetryQuery::ClusterCpuPct, "n1", 91.0)
            .with_scalar(TelemetryQuery::ClusterMemUsedPct, "n1", 40.0)
            .with(
                TelemetryQuery::TopContainersCpu { k: 5 },
                vec![
                    sample(&[("container", "api"), ("instance", "n1")], 0.8),
                    sample(&[("container", "db"), ("instance", "n2")], 0.6),
                ],
            );
        let exec = executor(&dir, gateway, OffPeak::default());

        let facts = exec
            .report(&ReportRequest {
                window: "1h".to_string(),
                top_k: 5,
                filters: ReportFilters {
                    instance: Some("n2".to_string()),
                },
            })
            .await
            .unwrap();

        assert_eq!(facts.profile.top_cpu_containers.len(), 1);
        assert_eq!(facts.profile.top_cpu_containers[0].name, "db");
        assert!(facts
            .facts
            .contains(&"Average CPU utilization over the last 1h was 91.0%.".to_string()));
        assert!(facts
            .facts
            .contains(&"No data for 1-minute load over the last 1h.".to_string()));
        assert!(facts
            .facts
            .contains(&"Top 5 containers by CPU: db=0.6000.".to_string()));
        assert!(facts.facts.iter().any(|f| f.starts_with("CPU utilization is high")));
        assert!(facts.facts.contains(&"No recorded jobs.".to_string()));
    }

    #[tokio::test]
    async fn test_telemetry_failure_surfaces() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, FakeGateway::failing(), OffPeak::default());
        let err = exec
            .execute(PlanRequest::CanRun(CapacityRequest {
                requirements: Requirements::default(),
                duration: "45m".to_string(),
                host: None,
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, AdvisorError::UpstreamUnavailable(_)));
    }
}
