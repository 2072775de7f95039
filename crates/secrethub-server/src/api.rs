//! The REST surface the core exposes to the web layer.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /sys/init` | Coordinated initialization; returns shares exactly once |
//! | `POST /sys/unseal` | Submit one unseal share |
//! | `POST /sys/seal` | Seal the local node |
//! | `GET /sys/seal-status` | Seal state machine status |
//! | `GET /sys/health` | Liveness, seal state, dependency checks |
//! | `GET /cluster/info` | Registered node records |

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use secrethub_cluster::{ClusterCoordinator, ClusterError, InitOutcome};
use secrethub_crypto::{CryptoError, UnsealShare};
use secrethub_seal::{SealError, SealHandle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    /// Seal actor handle.
    pub seal: SealHandle,
    /// Cluster coordinator.
    pub coordinator: Arc<ClusterCoordinator>,
    /// Software version advertised on health and cluster surfaces.
    pub version: String,
}

/// Build the router over the app state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sys/init", post(init))
        .route("/sys/unseal", post(unseal))
        .route("/sys/seal", post(seal))
        .route("/sys/seal-status", get(seal_status))
        .route("/sys/health", get(health))
        .route("/cluster/info", get(cluster_info))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct InitRequest {
    total_shares: u8,
    threshold: u8,
}

#[derive(Debug, Serialize)]
pub(crate) struct InitResponse {
    shares: Vec<String>,
    progress: u8,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UnsealRequest {
    share: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UnsealResponse {
    sealed: bool,
    progress: u8,
    threshold: u8,
}

#[derive(Debug, Serialize)]
pub(crate) struct SealResponse {
    sealed: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct SealStatusResponse {
    initialized: bool,
    sealed: bool,
    progress: u8,
    threshold: u8,
    total_shares: u8,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    status: String,
    initialized: bool,
    sealed: bool,
    checks: serde_json::Value,
    version: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct NodeInfo {
    node_id: String,
    hostname: String,
    status: String,
    leader: bool,
    sealed: bool,
    initialized: bool,
    last_seen_at: String,
    started_at: String,
    version: String,
    metadata: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// An API-level error: a status code plus a machine-readable kind.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.kind,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<SealError> for ApiError {
    fn from(error: SealError) -> Self {
        match &error {
            SealError::Sealed => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "sealed", error.to_string())
            },
            SealError::NotInitialized => Self::new(
                StatusCode::BAD_REQUEST,
                "not_initialized",
                error.to_string(),
            ),
            SealError::AlreadyInitialized => Self::new(
                StatusCode::BAD_REQUEST,
                "already_initialized",
                error.to_string(),
            ),
            SealError::Crypto(CryptoError::InvalidShare(_)) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_share",
                error.to_string(),
            ),
            SealError::Crypto(CryptoError::InvalidThresholdConfig { .. }) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_config",
                error.to_string(),
            ),
            SealError::Crypto(CryptoError::ReconstructionFailed) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "reconstruction_failed",
                error.to_string(),
            ),
            _ => internal(&error),
        }
    }
}

impl From<ClusterError> for ApiError {
    fn from(error: ClusterError) -> Self {
        match error {
            ClusterError::InitLockTimeout => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "init_lock_timeout",
                "init lock timeout",
            ),
            ClusterError::Seal(seal_error) => Self::from(seal_error),
            other => internal(&other),
        }
    }
}

fn internal(error: &dyn std::fmt::Display) -> ApiError {
    // Internal detail stays in the logs; the body is opaque.
    error!(%error, "internal error on API surface");
    ApiError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal",
        "internal error",
    )
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn init(
    State(state): State<AppState>,
    Json(request): Json<InitRequest>,
) -> Result<Json<InitResponse>, ApiError> {
    let outcome = state
        .coordinator
        .coordinated_init(request.threshold, request.total_shares)
        .await?;

    match outcome {
        InitOutcome::Initialized(shares) => Ok(Json(InitResponse {
            shares: shares.iter().map(UnsealShare::to_hex).collect(),
            progress: 0,
        })),
        InitOutcome::AlreadyInitialized => Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "already_initialized",
            "vault is already initialized",
        )),
    }
}

async fn unseal(
    State(state): State<AppState>,
    Json(request): Json<UnsealRequest>,
) -> Result<Json<UnsealResponse>, ApiError> {
    let share = UnsealShare::from_hex(&request.share).map_err(|e| {
        ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_share", e.to_string())
    })?;
    let progress = state.seal.unseal(share).await?;
    Ok(Json(UnsealResponse {
        sealed: progress.sealed,
        progress: progress.progress,
        threshold: progress.threshold,
    }))
}

async fn seal(State(state): State<AppState>) -> Result<Json<SealResponse>, ApiError> {
    state.seal.seal().await?;
    Ok(Json(SealResponse { sealed: true }))
}

async fn seal_status(
    State(state): State<AppState>,
) -> Result<Json<SealStatusResponse>, ApiError> {
    let status = state.seal.status().await?;
    Ok(Json(SealStatusResponse {
        initialized: status.initialized,
        sealed: status.sealed,
        progress: status.progress,
        threshold: status.threshold,
        total_shares: status.total_shares,
    }))
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let status = state.seal.status().await?;

    let database_ok = state.coordinator.cluster_info().await.is_ok();
    let overall = if !database_ok {
        "degraded"
    } else if !status.initialized {
        "uninitialized"
    } else if status.sealed {
        "sealed"
    } else {
        "ok"
    };

    Ok(Json(HealthResponse {
        status: overall.to_string(),
        initialized: status.initialized,
        sealed: status.sealed,
        checks: serde_json::json!({
            "database": if database_ok { "ok" } else { "error" },
        }),
        version: state.version.clone(),
    }))
}

async fn cluster_info(State(state): State<AppState>) -> Result<Json<Vec<NodeInfo>>, ApiError> {
    let status = state.seal.status().await?;
    let nodes = state.coordinator.cluster_info().await?;

    Ok(Json(
        nodes
            .into_iter()
            .map(|node| NodeInfo {
                node_id: node.node_id.to_string(),
                hostname: node.hostname,
                status: node.status.to_string(),
                leader: node.is_leader,
                sealed: node.status != secrethub_core::NodeStatus::Unsealed,
                initialized: status.initialized,
                last_seen_at: node.last_seen_at.to_rfc3339(),
                started_at: node.started_at.to_rfc3339(),
                version: node.version,
                metadata: node.metadata,
            })
            .collect(),
    ))
}
