//! Health endpoint.
//!
//! # Key invariants and assumptions
//! - Health checks must be fast and side-effect free.
use crate::api::error::{ApiError, api_internal};
use crate::api::types::HealthStatus;
use crate::app::AppState;
use axum::Json;
use axum::extract::State;

#[utoipa::path(
    get,
    path = "/system/health",
    tag = "system",
    responses(
        (status = 200, description = "Service and policy store are healthy", body = HealthStatus),
        (status = 500, description = "Policy store unreachable", body = crate::api::types::ErrorResponse)
    )
)]
/// Return `ok` when the policy store answers.
pub(crate) async fn system_health(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, ApiError> {
    if let Err(err) = state.store.health_check().await {
        return Err(api_internal("storage unavailable", &err));
    }
    Ok(Json(HealthStatus {
        status: "ok".to_string(),
    }))
}
