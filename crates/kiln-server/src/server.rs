//! Axum web server for job submission

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use kiln_core::{BuildJob, JobId, KilnError, ServiceConfig};
use kiln_orchestrator::Orchestrator;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::dispatch::{JobSink, SpawningSink};

/// Shared application state
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    /// `None` until the service is fully configured
    pub jobs: Option<Arc<dyn JobSink>>,
}

pub type SharedState = Arc<AppState>;

/// Rejection surfaced to the caller as `{"detail": ...}`
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<KilnError> for ApiError {
    fn from(e: KilnError) -> Self {
        match e {
            KilnError::Authorization(msg) => Self::new(
                StatusCode::FORBIDDEN,
                format!("Authentication failed: {}", msg),
            ),
            KilnError::Configuration(msg) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Server is not fully configured: {}", msg),
            ),
            KilnError::InvalidJob(msg) => Self::new(StatusCode::BAD_REQUEST, msg),
            other => Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

/// Build the router over the given state
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/build", post(submit_build))
        .route("/api/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until ctrl-c
///
/// Starts even when credentials are missing; submissions are then answered
/// with 503 until the service is restarted with a complete configuration.
pub async fn serve(config: Arc<ServiceConfig>) -> anyhow::Result<()> {
    let missing = config.missing_credentials();
    for name in &missing {
        warn!("Missing required setting: {}", name);
    }

    let jobs: Option<Arc<dyn JobSink>> = if missing.is_empty() {
        let orchestrator = Orchestrator::from_config(Arc::clone(&config))
            .context("Failed to initialize the build pipeline")?;
        let sink: Arc<dyn JobSink> = Arc::new(SpawningSink::new(Arc::new(orchestrator)));
        Some(sink)
    } else {
        warn!("Build submissions will be rejected with 503 until configured");
        None
    };

    let addr = config.server.bind.clone();
    let app = router(Arc::new(AppState { config, jobs }));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Kiln listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Secret and configuration checks, before any state transition
fn authorize(config: &ServiceConfig, job: &BuildJob) -> kiln_core::Result<()> {
    if config.shared_secret.is_none() {
        return Err(KilnError::Configuration(
            "missing required settings: shared_secret".to_string(),
        ));
    }
    if !config.secret_matches(&job.secret) {
        warn!("Rejected build request for '{}': invalid secret", job.project);
        return Err(KilnError::Authorization("Invalid secret.".to_string()));
    }
    config.ensure_ready()
}

/// POST /api/build - validate, authorize and enqueue a job
async fn submit_build(
    State(app): State<SharedState>,
    payload: Result<Json<BuildJob>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(job) =
        payload.map_err(|rejection| ApiError::new(StatusCode::BAD_REQUEST, rejection.body_text()))?;

    authorize(&app.config, &job)?;
    job.validate()?;

    let jobs = app.jobs.as_ref().ok_or_else(|| {
        KilnError::Configuration("build pipeline is not running".to_string())
    })?;

    let job = job.sanitized();
    let job_id = JobId::new();
    info!(
        job_id = %job_id,
        task = %job.project,
        round = job.round,
        "Accepted build request"
    );
    jobs.submit(job_id, job);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "message": "The build and deploy process has been started in the background.",
            "job_id": job_id.to_string(),
        })),
    ))
}

/// GET /api/health
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "kiln"
    }))
}
