//! Policy advisor library
//!
//! This crate provides the core functionality for:
//! - Durable policy and job-run stores
//! - Guardrail parsing and verification
//! - Workload profiling from cluster telemetry
//! - Policy scoring and batch assignment
//! - Structured planner requests (reports, capacity checks, windows)
//! - Health checks and observability

pub mod error;
pub mod guardrail;
pub mod health;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod planner;
pub mod profiler;
pub mod scoring;
pub mod store;
pub mod telemetry;

pub use error::{AdvisorError, AdvisorResult};
pub use guardrail::{Guardrail, VerificationOutcome, VerificationStatus, Violation};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AdvisorMetrics, StructuredLogger};
pub use orchestrator::{
    AssignRequest, AssignmentOutcome, FinishRequest, JobDescriptor, PolicyRunRequest,
    SchedulingOrchestrator, VerifyRequest,
};
pub use planner::{AdviceExecutor, OffPeak, PlanRequest, PlanResponse};
pub use profiler::{ProfileRequest, ProfilerConfig, WorkloadProfiler};
pub use scoring::{PolicyScore, Selection};
pub use store::{JobEvent, JobStore, MetadataUpdate, NewPolicy, PolicyStore, SearchHit, SearchQuery};
pub use telemetry::{PrometheusGateway, Sample, TelemetryGateway, TelemetryQuery};
