//! HTTP API for the policy advisor

use advisor_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::AdvisorMetrics,
    AdviceExecutor, AdvisorError, AssignRequest, FinishRequest, JobEvent, MetadataUpdate,
    NewPolicy, PlanRequest, PolicyRunRequest, ProfileRequest, SchedulingOrchestrator,
    SearchQuery, VerifyRequest,
};
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{de::DeserializeOwned, Deserialize};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
pub struct AppState {
    pub orchestrator: Arc<SchedulingOrchestrator>,
    pub advice: AdviceExecutor,
    pub health_registry: HealthRegistry,
    pub metrics: AdvisorMetrics,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<SchedulingOrchestrator>,
        advice: AdviceExecutor,
        health_registry: HealthRegistry,
        metrics: AdvisorMetrics,
    ) -> Self {
        Self {
            orchestrator,
            advice,
            health_registry,
            metrics,
        }
    }
}

/// Error returned by handlers, rendered as `{"error", "code"}`
#[derive(Debug)]
pub struct ApiError(AdvisorError);

impl From<AdvisorError> for ApiError {
    fn from(err: AdvisorError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(AdvisorError::InvalidInput(rejection.body_text()))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            AdvisorError::PolicyNotFound(_)
            | AdvisorError::JobNotFound(_)
            | AdvisorError::NoCandidates => StatusCode::NOT_FOUND,
            AdvisorError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AdvisorError::PolicyExists(_) | AdvisorError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            AdvisorError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            AdvisorError::Persistence { .. } | AdvisorError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "Request failed");
        }
        let body = serde_json::json!({
            "error": self.0.to_string(),
            "code": self.0.code(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_json<T: DeserializeOwned>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    Ok(payload?.0)
}

/// Health check response - 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus scrape endpoint; store gauges are refreshed on every scrape
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let orchestrator = &state.orchestrator;
    state.metrics.set_store_sizes(
        orchestrator.policies().len().await,
        orchestrator.jobs().len().await,
    );

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn list_policies(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.orchestrator.list_policies().await)
}

async fn create_policy(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewPolicy>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let record = state.orchestrator.create_policy(parse_json(payload)?).await?;
    info!(policy_id = %record.id, "Policy created via API");
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_policy(
    State(state): State<Arc<AppState>>,
    Path(policy_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.get_policy(&policy_id).await?))
}

async fn update_policy(
    State(state): State<Arc<AppState>>,
    Path(policy_id): Path<String>,
    payload: Result<Json<MetadataUpdate>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let update = parse_json(payload)?;
    Ok(Json(
        state
            .orchestrator
            .update_policy_metadata(&policy_id, update)
            .await?,
    ))
}

async fn record_policy_run(
    State(state): State<Arc<AppState>>,
    Path(policy_id): Path<String>,
    payload: Result<Json<PolicyRunRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let run = parse_json(payload)?;
    Ok(Json(
        state.orchestrator.record_policy_run(&policy_id, run).await?,
    ))
}

async fn verify_policy(
    State(state): State<Arc<AppState>>,
    Path(policy_id): Path<String>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let request = parse_json(payload)?;
    Ok(Json(
        state.orchestrator.verify_policy(&policy_id, &request).await?,
    ))
}

async fn search_policies(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SearchQuery>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let query = parse_json(payload)?;
    Ok(Json(state.orchestrator.search_policies(&query).await))
}

async fn record_job(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<JobEvent>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let event = parse_json(payload)?;
    Ok(Json(state.orchestrator.record_job_event(event).await?))
}

#[derive(Debug, Deserialize)]
struct JobsParams {
    limit: Option<usize>,
}

async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<JobsParams>,
) -> impl IntoResponse {
    let limit = params
        .limit
        .unwrap_or(state.orchestrator.profiler().config().recent_jobs);
    Json(state.orchestrator.recent_jobs(limit).await)
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.get_job(&job_id).await?))
}

async fn start_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.start_job(&job_id).await?))
}

/// The body is optional; an empty one finishes the job as succeeded
async fn finish_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let request = if body.is_empty() {
        FinishRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AdvisorError::InvalidInput(format!("invalid finish payload: {e}")))?
    };
    Ok(Json(state.orchestrator.finish_job(&job_id, request).await?))
}

async fn assign(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AssignRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let request = parse_json(payload)?;
    Ok(Json(state.orchestrator.assign_batch(request).await?))
}

async fn profile(
    State(state): State<Arc<AppState>>,
    Query(request): Query<ProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.profile(&request).await?))
}

async fn execute_plan(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PlanRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let plan = parse_json(payload)?;
    Ok(Json(state.advice.execute(plan).await?))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/policies", get(list_policies).post(create_policy))
        .route("/policies/search", post(search_policies))
        .route("/policies/:id", get(get_policy).patch(update_policy))
        .route("/policies/:id/runs", post(record_policy_run))
        .route("/policies/:id/verify", post(verify_policy))
        .route("/jobs", get(list_jobs))
        .route("/jobs/run", post(record_job))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/start", post(start_job))
        .route("/jobs/:id/finish", post(finish_job))
        .route("/scheduler/assign", post(assign))
        .route("/profile", get(profile))
        .route("/plan/execute", post(execute_plan))
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
