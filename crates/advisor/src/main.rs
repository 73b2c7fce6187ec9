//! Policy Advisor - policy selection service
//!
//! Loads both stores, connects the Prometheus telemetry gateway and serves
//! the advisor HTTP API until interrupted.

use advisor_lib::{
    health::{components, HealthRegistry},
    observability::{AdvisorMetrics, StructuredLogger},
    AdviceExecutor, JobStore, PolicyStore, PrometheusGateway, SchedulingOrchestrator,
    WorkloadProfiler,
};
use anyhow::{Context, Result};
use policy_advisor::{api, config::AdvisorConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ADVISOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting policy-advisor");

    let config = AdvisorConfig::load()?;
    info!(
        api_port = config.api_port,
        prometheus_url = %config.prometheus_url,
        "Advisor configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::POLICY_STORE).await;
    health_registry.register(components::JOB_STORE).await;
    health_registry.register(components::TELEMETRY).await;

    let seeds_path = config
        .policy_seeds_path
        .as_deref()
        .filter(|path| !path.as_os_str().is_empty());
    let policies = Arc::new(
        PolicyStore::open(&config.policy_store_path, seeds_path)
            .context("Failed to open policy store")?,
    );
    let jobs = Arc::new(JobStore::open(&config.job_store_path).context("Failed to open job store")?);

    let gateway = PrometheusGateway::builder(&config.prometheus_url)
        .timeout(config.telemetry_timeout())
        .build()?;
    let profiler = WorkloadProfiler::new(
        Arc::new(gateway),
        jobs.clone(),
        policies.clone(),
        config.profiler(),
    );
    let orchestrator = Arc::new(
        SchedulingOrchestrator::new(policies.clone(), jobs.clone(), profiler)
            .with_health(health_registry.clone()),
    );
    let advice = AdviceExecutor::new(orchestrator.clone(), config.offpeak());

    let metrics = AdvisorMetrics::new();
    let (policy_count, job_count) = (policies.len().await, jobs.len().await);
    metrics.set_store_sizes(policy_count, job_count);

    let logger = StructuredLogger::new("policy-advisor");
    logger.log_startup(ADVISOR_VERSION, policy_count, job_count);

    let app_state = Arc::new(api::AppState::new(
        orchestrator,
        advice,
        health_registry.clone(),
        metrics,
    ));

    health_registry.set_ready(true).await;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };
    api::serve(config.api_port, app_state, shutdown).await?;

    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    Ok(())
}
