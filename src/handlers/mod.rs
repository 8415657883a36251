use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, instrument, warn};

use crate::encoding::validate_cluster_name;
use crate::error::{SyncError, SyncResult};
use crate::models::{ClusterStatus, ReconcileRequest, SyncRequest, SyncResponse};
use crate::sync::SyncOutcome;
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/sync/:cluster", post(sync_handler))
        .route("/resync/:cluster", post(resync_handler))
        .route("/status/:cluster", get(status_handler))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "service": "search-sync-rs",
                "database": "connected",
            })),
        ),
        Err(e) => {
            error!("Database ping failed: {}", e);
            let database = if e.is_connection() {
                "connection failed"
            } else {
                "ping failed"
            };
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "search-sync-rs",
                    "database": database,
                    "error": e.to_string(),
                })),
            )
        }
    }
}

fn check_cluster(cluster: &str) -> SyncResult<()> {
    validate_cluster_name(cluster).map_err(|e| SyncError::InvalidRequest(e.to_string()))
}

/// Partial results are still returned when the store went away mid-sync.
fn respond(outcome: SyncOutcome) -> (StatusCode, Json<SyncResponse>) {
    match outcome.connection_error {
        Some(e) => {
            warn!("Sync incomplete, store unreachable: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, Json(outcome.response))
        }
        None => (StatusCode::OK, Json(outcome.response)),
    }
}

/// Incremental sync of one cluster
#[instrument(skip(state, request))]
pub async fn sync_handler(
    State(state): State<AppState>,
    Path(cluster): Path<String>,
    Json(request): Json<SyncRequest>,
) -> SyncResult<(StatusCode, Json<SyncResponse>)> {
    check_cluster(&cluster)?;
    info!(
        "Sync request for {}: {} adds, {} updates, {} deletes, {} edge adds, {} edge deletes",
        cluster,
        request.add_resources.len(),
        request.update_resources.len(),
        request.delete_resources.len(),
        request.add_edges.len(),
        request.delete_edges.len()
    );

    let guard = state.locks.acquire(&cluster).await;
    let outcome = state.engine.sync(&cluster, request, guard.waited).await?;
    Ok(respond(outcome))
}

/// Full reconciliation of one cluster
#[instrument(skip(state, request))]
pub async fn resync_handler(
    State(state): State<AppState>,
    Path(cluster): Path<String>,
    Json(request): Json<ReconcileRequest>,
) -> SyncResult<(StatusCode, Json<SyncResponse>)> {
    check_cluster(&cluster)?;
    info!(
        "Resync request for {}: {} resources, {} edges",
        cluster,
        request.resources.len(),
        request.edges.len()
    );

    let guard = state.locks.acquire(&cluster).await;
    let outcome = state.engine.resync(&cluster, request, guard.waited).await?;
    Ok(respond(outcome))
}

pub async fn status_handler(
    State(state): State<AppState>,
    Path(cluster): Path<String>,
) -> SyncResult<Json<ClusterStatus>> {
    check_cluster(&cluster)?;
    Ok(Json(state.engine.status(&cluster).await?))
}
