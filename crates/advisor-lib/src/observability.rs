//! Observability for the policy advisor
//!
//! Provides:
//! - Prometheus metrics (assignment and telemetry latency, assignment and
//!   verification counters, store sizes)
//! - Structured event logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for request-scale latencies (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

static GLOBAL_METRICS: OnceLock<AdvisorMetricsInner> = OnceLock::new();

struct AdvisorMetricsInner {
    assignment_latency_seconds: Histogram,
    telemetry_latency_seconds: Histogram,
    batches_assigned: IntCounter,
    jobs_recorded: IntCounter,
    verifications: IntCounterVec,
    telemetry_errors: IntCounter,
    policies: IntGauge,
    jobs: IntGauge,
}

impl AdvisorMetricsInner {
    fn new() -> Self {
        Self {
            assignment_latency_seconds: register_histogram!(
                "policy_advisor_assignment_latency_seconds",
                "Time spent profiling, scoring and recording a job batch",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register assignment_latency_seconds"),

            telemetry_latency_seconds: register_histogram!(
                "policy_advisor_telemetry_latency_seconds",
                "Time spent building a workload profile from telemetry",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register telemetry_latency_seconds"),

            batches_assigned: register_int_counter!(
                "policy_advisor_batches_assigned_total",
                "Total number of job batches assigned a policy"
            )
            .expect("Failed to register batches_assigned"),

            jobs_recorded: register_int_counter!(
                "policy_advisor_jobs_recorded_total",
                "Total number of job records written"
            )
            .expect("Failed to register jobs_recorded"),

            verifications: register_int_counter_vec!(
                "policy_advisor_verifications_total",
                "Guardrail verifications by outcome",
                &["outcome"]
            )
            .expect("Failed to register verifications"),

            telemetry_errors: register_int_counter!(
                "policy_advisor_telemetry_errors_total",
                "Total number of failed telemetry queries"
            )
            .expect("Failed to register telemetry_errors"),

            policies: register_int_gauge!(
                "policy_advisor_policies",
                "Number of policies in the catalog"
            )
            .expect("Failed to register policies"),

            jobs: register_int_gauge!("policy_advisor_jobs", "Number of recorded jobs")
                .expect("Failed to register jobs"),
        }
    }
}

/// Handle to the process-wide advisor metrics.
///
/// Clones share the same underlying collectors, which are registered with
/// the default Prometheus registry on first use.
#[derive(Clone)]
pub struct AdvisorMetrics {
    _private: (),
}

impl Default for AdvisorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvisorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AdvisorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AdvisorMetricsInner {
        GLOBAL_METRICS.get_or_init(AdvisorMetricsInner::new)
    }

    pub fn observe_assignment_latency(&self, duration_secs: f64) {
        self.inner().assignment_latency_seconds.observe(duration_secs);
    }

    pub fn observe_telemetry_latency(&self, duration_secs: f64) {
        self.inner().telemetry_latency_seconds.observe(duration_secs);
    }

    pub fn inc_batches_assigned(&self) {
        self.inner().batches_assigned.inc();
    }

    pub fn add_jobs_recorded(&self, count: u64) {
        self.inner().jobs_recorded.inc_by(count);
    }

    /// Count a verification under `accepted` or `rejected`
    pub fn inc_verification(&self, accepted: bool) {
        let outcome = if accepted { "accepted" } else { "rejected" };
        self.inner().verifications.with_label_values(&[outcome]).inc();
    }

    pub fn inc_telemetry_errors(&self) {
        self.inner().telemetry_errors.inc();
    }

    pub fn set_store_sizes(&self, policies: usize, jobs: usize) {
        self.inner().policies.set(policies as i64);
        self.inner().jobs.set(jobs as i64);
    }
}

/// Consistently shaped log records for advisor decisions
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_assignment(
        &self,
        policy_id: &str,
        score: f64,
        jobs: usize,
        recorded: bool,
        alternatives: usize,
    ) {
        info!(
            event = "batch_assigned",
            service = %self.service,
            policy_id = %policy_id,
            score = score,
            jobs = jobs,
            recorded = recorded,
            alternatives = alternatives,
            "Assigned policy to job batch"
        );
    }

    pub fn log_verification(&self, policy_id: &str, accepted: bool, violations: usize) {
        if accepted {
            info!(
                event = "policy_verified",
                service = %self.service,
                policy_id = %policy_id,
                "Policy passed guardrail verification"
            );
        } else {
            warn!(
                event = "policy_rejected",
                service = %self.service,
                policy_id = %policy_id,
                violations = violations,
                "Policy failed guardrail verification"
            );
        }
    }

    pub fn log_job_transition(&self, job_id: &str, from: &str, to: &str) {
        info!(
            event = "job_transition",
            service = %self.service,
            job_id = %job_id,
            from = %from,
            to = %to,
            "Job status changed"
        );
    }

    pub fn log_startup(&self, version: &str, policies: usize, jobs: usize) {
        info!(
            event = "advisor_started",
            service = %self.service,
            version = %version,
            policies = policies,
            jobs = jobs,
            "Policy advisor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "advisor_shutdown",
            service = %self.service,
            reason = %reason,
            "Policy advisor shutting down"
        );
    }
}
