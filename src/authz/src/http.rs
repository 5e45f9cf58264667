//! REST surface over [`AuthzEngine`]
//!
//! ## Endpoints
//!
//! - `POST /v1/check` - Authorization check by bit or by table operation
//! - `POST /v1/hierarchies/:kind/mutations` - Apply hierarchy mutations in order
//! - `GET /v1/hierarchies/:kind/closure` - Dump a closure cache
//! - `POST /v1/assignments` - Apply one assignment mutation
//! - `POST /v1/maintenance/:target/{suspend,resume,reconcile}` - Bulk-load controls
//! - `GET /v1/validate` - Compare caches with a full recompute
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics

use crate::assignment::AssignmentMutation;
use crate::closure::ClosureEntry;
use crate::config::Operation;
use crate::engine::{AccessDecision, AuthzEngine, MaintenanceTarget, MutationOutcome, ValidationReport};
use crate::error::AuthzError;
use crate::graph::GraphMutation;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use hierarch_core::{HierarchyKind, NodeId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

/// Shared application state
#[derive(Clone)]
struct AppState {
    engine: Arc<AuthzEngine>,
    start_time: Instant,
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Application error type
#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<AuthzError> for AppError {
    fn from(err: AuthzError) -> Self {
        let message = err.to_string();
        match err {
            AuthzError::InvalidInput(_)
            | AuthzError::Bitmask(_)
            | AuthzError::Json(_)
            | AuthzError::UnknownCapability(_) => AppError::BadRequest(message),
            AuthzError::UnknownNode { .. } | AuthzError::UnknownEdge { .. } | AuthzError::UnknownAssignment { .. } => {
                AppError::NotFound(message)
            }
            AuthzError::DuplicateNode { .. }
            | AuthzError::DuplicateEdge { .. }
            | AuthzError::DuplicateAssignment { .. } => AppError::Conflict(message),
            AuthzError::Suspended(_) | AuthzError::StaleCombinedCache => AppError::Unavailable(message),
            AuthzError::Configuration(_) | AuthzError::CacheDrift { .. } | AuthzError::Io(_) => {
                AppError::Internal(message)
            }
        }
    }
}

fn parse_kind(raw: &str) -> Result<HierarchyKind, AppError> {
    raw.parse().map_err(|_| AppError::BadRequest(format!("unknown hierarchy: {raw}")))
}

/// Authorization check request
///
/// Either `bit` or all of `table`, `principal_class` and `operation`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckRequest {
    #[serde(default)]
    pub principal: Option<NodeId>,
    pub resource: NodeId,
    #[serde(default)]
    pub bit: Option<usize>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub principal_class: Option<String>,
    #[serde(default)]
    pub operation: Option<Operation>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
}

#[derive(Debug, Serialize)]
struct ReconcileResponse {
    target: MaintenanceTarget,
    entries: usize,
}

#[derive(Debug, Serialize)]
struct AssignmentResponse {
    keys_changed: usize,
}

/// Metrics response (Prometheus format)
struct MetricsResponse {
    metrics: String,
}

impl IntoResponse for MetricsResponse {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            self.metrics,
        )
            .into_response()
    }
}

/// POST /v1/check
async fn check(State(state): State<AppState>, Json(req): Json<CheckRequest>) -> Result<Json<AccessDecision>, AppError> {
    let decision = match (req.bit, req.table, req.principal_class, req.operation) {
        (Some(bit), _, _, _) => {
            state
                .engine
                .authorize_with_trace(req.principal, req.resource, bit)
                .await?
        }
        (None, Some(table), Some(class), Some(op)) => {
            state
                .engine
                .authorize_operation(req.principal, &table, &class, op, req.resource)
                .await?
        }
        _ => {
            return Err(AppError::BadRequest(
                "expected `bit` or `table`, `principal_class` and `operation`".to_string(),
            ))
        }
    };

    info!(
        resource = %decision.resource,
        capability = decision.capability,
        allowed = decision.allowed,
        "check served"
    );
    Ok(Json(decision))
}

/// POST /v1/hierarchies/:kind/mutations
async fn apply_mutations(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(mutations): Json<Vec<GraphMutation>>,
) -> Result<Json<Vec<MutationOutcome>>, AppError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(state.engine.apply_all(kind, mutations).await?))
}

/// GET /v1/hierarchies/:kind/closure
async fn closure(State(state): State<AppState>, Path(kind): Path<String>) -> Result<Json<Vec<ClosureEntry>>, AppError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(state.engine.closure_entries(kind).await))
}

/// POST /v1/assignments
async fn apply_assignment(
    State(state): State<AppState>,
    Json(mutation): Json<AssignmentMutation>,
) -> Result<Json<AssignmentResponse>, AppError> {
    let keys_changed = state.engine.apply_assignment(mutation).await?;
    Ok(Json(AssignmentResponse { keys_changed }))
}

/// POST /v1/maintenance/:target/:action
async fn maintenance(
    State(state): State<AppState>,
    Path((target, action)): Path<(String, String)>,
) -> Result<Json<ReconcileResponse>, AppError> {
    let target: MaintenanceTarget = target.parse().map_err(|e: AuthzError| AppError::BadRequest(e.to_string()))?;
    let entries = match action.as_str() {
        "suspend" => {
            state.engine.suspend(target).await;
            0
        }
        "resume" => state.engine.resume(target).await,
        "reconcile" => state.engine.reconcile(target).await?,
        other => return Err(AppError::NotFound(format!("unknown maintenance action: {other}"))),
    };
    Ok(Json(ReconcileResponse { target, entries }))
}

/// GET /v1/validate
async fn validate(State(state): State<AppState>) -> Json<ValidationReport> {
    Json(state.engine.validate().await)
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        version: crate::VERSION.to_string(),
    })
}

/// GET /metrics
async fn metrics(State(state): State<AppState>) -> MetricsResponse {
    let uptime = state.start_time.elapsed().as_secs();
    let mut metrics = state.engine.metrics().export_prometheus().await;
    metrics.push_str(&format!(
        "\n# HELP hierarch_uptime_seconds Server uptime in seconds\n\
         # TYPE hierarch_uptime_seconds gauge\n\
         hierarch_uptime_seconds {uptime}\n"
    ));
    MetricsResponse { metrics }
}

/// Create the HTTP router with all endpoints
pub fn router(engine: Arc<AuthzEngine>) -> Router {
    let state = AppState {
        engine,
        start_time: Instant::now(),
    };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let trace = TraceLayer::new_for_http().on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/v1/check", post(check))
        .route("/v1/hierarchies/:kind/mutations", post(apply_mutations))
        .route("/v1/hierarchies/:kind/closure", get(closure))
        .route("/v1/assignments", post(apply_assignment))
        .route("/v1/maintenance/:target/:action", post(maintenance))
        .route("/v1/validate", get(validate))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(ServiceBuilder::new().layer(trace).layer(cors))
        .with_state(state)
}
