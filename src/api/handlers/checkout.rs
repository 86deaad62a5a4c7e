use axum::{extract::State, Extension, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    error::{AppError, Result},
    service::CheckoutRequest,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    pub instrument_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_price_cents: i64,
    pub pickup_time: Option<String>,
    pub return_time: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: String,
}

pub async fn begin_checkout(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(body): Json<CheckoutBody>,
) -> Result<Json<CheckoutResponse>> {
    let checkout_service = state
        .service_context
        .checkout_service
        .as_ref()
        .ok_or_else(|| {
            AppError::ServiceUnavailable("Payment processing is not configured".to_string())
        })?;

    let session = checkout_service
        .begin_checkout(
            current_user.user.id,
            CheckoutRequest {
                instrument_id: body.instrument_id,
                start_date: body.start_date,
                end_date: body.end_date,
                total_price_cents: body.total_price_cents,
                pickup_time: body.pickup_time,
                return_time: body.return_time,
            },
        )
        .await?;

    Ok(Json(CheckoutResponse {
        session_id: session.session_id,
        url: session.url,
    }))
}
