//! Scheduling orchestration
//!
//! Composes the profiler, the scoring engine and both stores into the
//! operations the service exposes: assigning a policy to a job batch,
//! driving the job lifecycle and verifying policies for activation.
//!
//! Job lifecycle: `scheduled → running → {succeeded | failed}`.

use crate::error::{AdvisorError, AdvisorResult};
use crate::guardrail::{evaluate_guardrails, VerificationOutcome, VerificationStatus};
use crate::health::{components, HealthRegistry};
use crate::models::{status, JobRun, PolicyRecord, WorkloadProfile};
use crate::observability::{AdvisorMetrics, StructuredLogger};
use crate::profiler::{ProfileRequest, WorkloadProfiler};
use crate::scoring::{select_policy, PolicyScore};
use crate::store::{
    matches_any_tag, JobEvent, JobStore, MetadataUpdate, NewPolicy, PolicyStore, SearchHit,
    SearchQuery,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// One job in a batch to be assigned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_id: String,
    pub workload: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Request to pick a policy for a batch of jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignRequest {
    pub jobs: Vec<JobDescriptor>,
    #[serde(default = "crate::profiler::default_window")]
    pub profile_window: String,
    /// Restrict candidates to policies targeting any of these workloads
    #[serde(default)]
    pub policy_tags: Vec<String>,
    #[serde(default = "default_record")]
    pub record_assignments: bool,
}

fn default_record() -> bool {
    true
}

impl AssignRequest {
    pub fn new(jobs: Vec<JobDescriptor>) -> Self {
        Self {
            jobs,
            profile_window: crate::profiler::default_window(),
            policy_tags: Vec::new(),
            record_assignments: true,
        }
    }

    /// Every job's workload plus its tags
    pub fn workload_tags(&self) -> BTreeSet<String> {
        self.jobs
            .iter()
            .flat_map(|job| std::iter::once(&job.workload).chain(job.tags.iter()))
            .filter(|tag| !tag.is_empty())
            .cloned()
            .collect()
    }
}

/// Result of a batch assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentOutcome {
    pub policy: PolicyRecord,
    pub score: PolicyScore,
    /// One `scheduled` run per job; persisted only when `recorded` is true
    pub assignments: Vec<JobRun>,
    pub recorded: bool,
    pub alternatives: Vec<PolicyScore>,
    pub profile: WorkloadProfile,
}

/// KPIs observed for one run of a policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyRunRequest {
    #[serde(default)]
    pub workload_label: Option<String>,
    pub kpis: BTreeMap<String, f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Completion report for a running job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishRequest {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_success() -> bool {
    true
}

impl Default for FinishRequest {
    fn default() -> Self {
        Self {
            success: true,
            metrics: BTreeMap::new(),
            notes: None,
        }
    }
}

/// Metrics to verify a policy's guardrails against
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    /// Per-metric threshold replacements
    #[serde(default)]
    pub overrides: BTreeMap<String, f64>,
}

pub struct SchedulingOrchestrator {
    policies: Arc<PolicyStore>,
    jobs: Arc<JobStore>,
    profiler: WorkloadProfiler,
    health: HealthRegistry,
    metrics: AdvisorMetrics,
    logger: StructuredLogger,
}

impl SchedulingOrchestrator {
    pub fn new(policies: Arc<PolicyStore>, jobs: Arc<JobStore>, profiler: WorkloadProfiler) -> Self {
        Self {
            policies,
            jobs,
            profiler,
            health: HealthRegistry::new(),
            metrics: AdvisorMetrics::new(),
            logger: StructuredLogger::new("policy-advisor"),
        }
    }

    /// Share a health registry so telemetry and store outcomes show up in
    /// `/healthz`
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn policies(&self) -> &Arc<PolicyStore> {
        &self.policies
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    pub fn profiler(&self) -> &WorkloadProfiler {
        &self.profiler
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Build a workload profile, tracking telemetry health and latency
    pub async fn profile(&self, request: &ProfileRequest) -> AdvisorResult<WorkloadProfile> {
        let start = Instant::now();
        let result = self.profiler.build(request).await;
        self.metrics
            .observe_telemetry_latency(start.elapsed().as_secs_f64());
        if result.is_err() {
            self.metrics.inc_telemetry_errors();
        }
        self.health.observe_telemetry(&result).await;
        result
    }

    /// Profile the cluster, score candidate policies for the batch and
    /// optionally record a `scheduled` run for every job
    pub async fn assign_batch(&self, request: AssignRequest) -> AdvisorResult<AssignmentOutcome> {
        let start = Instant::now();
        if request.jobs.is_empty() {
            return Err(AdvisorError::InvalidInput("jobs list cannot be empty".to_string()));
        }
        if let Some(job) = request.jobs.iter().find(|job| job.job_id.trim().is_empty()) {
            return Err(AdvisorError::InvalidInput(format!(
                "job with workload '{}' has an empty job_id",
                job.workload
            )));
        }

        let profile = self
            .profile(&ProfileRequest::for_window(request.profile_window.clone()))
            .await?;

        let tag_filter: HashSet<String> = request
            .policy_tags
            .iter()
            .map(|t| t.to_lowercase())
            .collect();
        let candidates: Vec<PolicyRecord> = self
            .policies
            .list()
            .await
            .into_iter()
            .filter(|p| tag_filter.is_empty() || matches_any_tag(p, &tag_filter))
            .collect();

        let workload_tags = request.workload_tags();
        let selection = select_policy(&candidates, &workload_tags, &profile.cluster_metrics)
            .ok_or(AdvisorError::NoCandidates)?;
        let policy = candidates
            .into_iter()
            .find(|p| p.id == selection.best.policy_id)
            .ok_or(AdvisorError::NoCandidates)?;

        let now = Utc::now();
        let assignments: Vec<JobRun> = request
            .jobs
            .iter()
            .map(|job| JobRun {
                job_id: job.job_id.clone(),
                workload: job.workload.clone(),
                policy_id: Some(policy.id.clone()),
                status: status::SCHEDULED.to_string(),
                submitted_at: now,
                started_at: None,
                finished_at: None,
                metrics: BTreeMap::new(),
                tags: job.tags.clone(),
                notes: None,
            })
            .collect();

        let assignments = if request.record_assignments {
            let recorded = self
                .observe_jobs(self.jobs.record_batch(assignments).await)
                .await?;
            self.metrics.add_jobs_recorded(recorded.len() as u64);
            self.refresh_store_gauges().await;
            recorded
        } else {
            assignments
        };

        self.metrics.inc_batches_assigned();
        self.metrics
            .observe_assignment_latency(start.elapsed().as_secs_f64());
        self.logger.log_assignment(
            &policy.id,
            selection.best.score,
            assignments.len(),
            request.record_assignments,
            selection.alternatives.len(),
        );

        Ok(AssignmentOutcome {
            policy,
            score: selection.best,
            assignments,
            recorded: request.record_assignments,
            alternatives: selection.alternatives,
            profile,
        })
    }

    /// Create a policy. Without an id one is derived from the name.
    pub async fn create_policy(&self, new: NewPolicy) -> AdvisorResult<PolicyRecord> {
        if new.name.trim().is_empty() {
            return Err(AdvisorError::InvalidInput("policy name cannot be empty".to_string()));
        }
        let id = match new.id.as_deref().map(str::trim) {
            Some("") => {
                return Err(AdvisorError::InvalidInput("policy id cannot be empty".to_string()))
            }
            Some(id) => id.to_string(),
            None => generate_policy_id(&new.name),
        };

        let record = self
            .observe_policies(self.policies.insert_new(id, new).await)
            .await?;
        self.refresh_store_gauges().await;
        Ok(record)
    }

    pub async fn get_policy(&self, policy_id: &str) -> AdvisorResult<PolicyRecord> {
        self.policies
            .get(policy_id)
            .await
            .ok_or_else(|| AdvisorError::PolicyNotFound(policy_id.to_string()))
    }

    pub async fn list_policies(&self) -> Vec<PolicyRecord> {
        self.policies.list().await
    }

    pub async fn update_policy_metadata(
        &self,
        policy_id: &str,
        update: MetadataUpdate,
    ) -> AdvisorResult<PolicyRecord> {
        self.observe_policies(self.policies.update_metadata(policy_id, update).await)
            .await
    }

    pub async fn record_policy_run(
        &self,
        policy_id: &str,
        run: PolicyRunRequest,
    ) -> AdvisorResult<PolicyRecord> {
        if run.kpis.is_empty() {
            return Err(AdvisorError::InvalidInput("kpis cannot be empty".to_string()));
        }
        let result = self
            .policies
            .add_run(policy_id, run.workload_label, run.kpis, run.notes)
            .await;
        self.observe_policies(result).await
    }

    pub async fn search_policies(&self, query: &SearchQuery) -> Vec<SearchHit> {
        self.policies.search(query).await
    }

    /// Check every guardrail against the supplied metrics. Only a clean
    /// result issues and registers an activation token. The guardrails are
    /// read and the token registered under one store lock.
    pub async fn verify_policy(
        &self,
        policy_id: &str,
        request: &VerifyRequest,
    ) -> AdvisorResult<VerificationOutcome> {
        let token = uuid::Uuid::new_v4().to_string();
        let mut violations = Vec::new();
        let result = self
            .policies
            .register_verification_if(policy_id, token.clone(), |policy| {
                violations =
                    evaluate_guardrails(&policy.guardrails, &request.metrics, &request.overrides);
                violations.is_empty()
            })
            .await;
        let registered = self.observe_policies(result).await?;

        let outcome = if registered.is_some() {
            VerificationOutcome {
                policy_id: policy_id.to_string(),
                status: VerificationStatus::Accepted,
                activation_token: Some(token),
                violations,
            }
        } else {
            VerificationOutcome {
                policy_id: policy_id.to_string(),
                status: VerificationStatus::Rejected,
                activation_token: None,
                violations,
            }
        };

        self.metrics.inc_verification(outcome.is_accepted());
        self.logger
            .log_verification(policy_id, outcome.is_accepted(), outcome.violations.len());
        Ok(outcome)
    }

    /// Raw lifecycle upsert
    pub async fn record_job_event(&self, event: JobEvent) -> AdvisorResult<JobRun> {
        if event.job_id.trim().is_empty() {
            return Err(AdvisorError::InvalidInput("job_id cannot be empty".to_string()));
        }
        if event.status.trim().is_empty() {
            return Err(AdvisorError::InvalidInput("status cannot be empty".to_string()));
        }
        let job = self.observe_jobs(self.jobs.upsert(event).await).await?;
        self.metrics.add_jobs_recorded(1);
        self.refresh_store_gauges().await;
        Ok(job)
    }

    pub async fn get_job(&self, job_id: &str) -> AdvisorResult<JobRun> {
        self.jobs
            .get(job_id)
            .await
            .ok_or_else(|| AdvisorError::JobNotFound(job_id.to_string()))
    }

    pub async fn recent_jobs(&self, limit: usize) -> Vec<JobRun> {
        self.jobs.recent(limit).await
    }

    /// Move a scheduled job to running
    pub async fn start_job(&self, job_id: &str) -> AdvisorResult<JobRun> {
        let result = self
            .jobs
            .update(job_id, |job| {
                if job.status != status::SCHEDULED {
                    return Err(AdvisorError::InvalidTransition {
                        job_id: job.job_id.clone(),
                        from: job.status.clone(),
                        to: status::RUNNING.to_string(),
                    });
                }
                job.status = status::RUNNING.to_string();
                job.started_at = Some(Utc::now());
                Ok(())
            })
            .await;
        let job = self.observe_jobs(result).await?;

        self.logger
            .log_job_transition(job_id, status::SCHEDULED, status::RUNNING);
        Ok(job)
    }

    /// Close a job as succeeded or failed. Reported metrics are also
    /// appended as a run of the job's policy when that policy exists; the
    /// job transition stands even if that run cannot be recorded.
    pub async fn finish_job(&self, job_id: &str, request: FinishRequest) -> AdvisorResult<JobRun> {
        let target = if request.success {
            status::SUCCEEDED
        } else {
            status::FAILED
        };

        let mut previous = String::new();
        let result = self
            .jobs
            .update(job_id, |job| {
                if status::is_terminal(&job.status) {
                    return Err(AdvisorError::InvalidTransition {
                        job_id: job.job_id.clone(),
                        from: job.status.clone(),
                        to: target.to_string(),
                    });
                }
                previous = std::mem::replace(&mut job.status, target.to_string());
                job.finished_at = Some(Utc::now());
                if !request.metrics.is_empty() {
                    job.metrics = request.metrics.clone();
                }
                if request.notes.is_some() {
                    job.notes = request.notes.clone();
                }
                Ok(())
            })
            .await;
        let job = self.observe_jobs(result).await?;

        self.logger.log_job_transition(job_id, &previous, target);

        if !request.metrics.is_empty() {
            match job.policy_id.as_deref() {
                Some(policy_id) if self.policies.contains(policy_id).await => {
                    let result = self
                        .policies
                        .add_run(
                            policy_id,
                            Some(job.workload.clone()),
                            request.metrics,
                            request.notes,
                        )
                        .await;
                    match self.observe_policies(result).await {
                        Ok(_) => {
                            debug!(job_id = %job_id, policy_id = %policy_id, "Job metrics recorded as policy run")
                        }
                        Err(e) => {
                            warn!(job_id = %job_id, policy_id = %policy_id, error = %e, "Failed to record job metrics as policy run")
                        }
                    }
                }
                Some(policy_id) => {
                    warn!(job_id = %job_id, policy_id = %policy_id, "Job references unknown policy, run not recorded");
                }
                None => {}
            }
        }

        Ok(job)
    }

    async fn observe_policies<T>(&self, result: AdvisorResult<T>) -> AdvisorResult<T> {
        self.health
            .observe_store(components::POLICY_STORE, &result)
            .await;
        result
    }

    async fn observe_jobs<T>(&self, result: AdvisorResult<T>) -> AdvisorResult<T> {
        self.health.observe_store(components::JOB_STORE, &result).await;
        result
    }

    async fn refresh_store_gauges(&self) {
        self.metrics
            .set_store_sizes(self.policies.len().await, self.jobs.len().await);
    }
}

/// `<slug of name>-<8 hex chars>`
pub fn generate_policy_id(name: &str) -> String {
    let mut slug = String::new();
    for c in name.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    let slug = if slug.is_empty() { "policy" } else { slug };

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{slug}-{}", &suffix[..8])
}
