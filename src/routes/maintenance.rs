use crate::error::AppError;
use crate::models::backup::MaintenanceStatus;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;

pub fn router(_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/run", post(run_maintenance))
        .route("/status", get(maintenance_status))
}

async fn run_maintenance(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    state.maintenance.start().await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "message": "Maintenance started",
            "statusCheckPath": "/api/maintenance/status",
        })),
    ))
}

async fn maintenance_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MaintenanceStatus>, AppError> {
    Ok(Json(state.maintenance.status().await))
}
