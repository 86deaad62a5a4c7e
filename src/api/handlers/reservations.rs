use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    error::{AppError, Result},
};

#[derive(Deserialize, Default)]
pub struct CancelBody {
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub reservation: crate::domain::Reservation,
    pub message: String,
}

pub async fn get(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>> {
    let (reservation, owner_id) = state
        .service_context
        .reservation_repo
        .find_with_owner(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Reservation not found".to_string()))?;

    if current_user.user.id != reservation.renter_id && current_user.user.id != owner_id {
        return Err(AppError::Forbidden);
    }

    Ok(Json(json!({ "reservation": reservation })))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelBody>>,
) -> Result<Json<CancelResponse>> {
    let reason = body.and_then(|Json(b)| b.reason);

    let reservation = state
        .service_context
        .cancellation_service
        .cancel(id, current_user.user.id, reason)
        .await?;

    Ok(Json(CancelResponse {
        reservation,
        message: "Reservation canceled. Payments are non-refundable.".to_string(),
    }))
}
