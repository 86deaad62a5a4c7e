use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};
use serde_json::{json, Value};

use crate::{
    api::state::AppState,
    error::{AppError, Result},
};

/// Entry point for the external scheduler. The auth check here is a thin
/// wrapper; the sweep itself lives in the sweep service.
pub async fn expire_reservations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let secret = state.settings.cron.secret.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("Cron secret is not configured".to_string())
    })?;

    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    if provided != secret {
        return Err(AppError::Unauthorized);
    }

    let count = state.service_context.sweep_service.sweep_expired().await?;

    Ok(Json(json!({ "expiredCount": count })))
}
