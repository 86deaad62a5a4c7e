use axum::{extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};

use crate::{
    api::state::AppState,
    error::{AppError, Result},
};

/// Inbound payment-processor events. Signature verification happens before
/// anything touches the database; processing failures return 500 so the
/// processor's retry mechanism becomes the recovery path.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>> {
    let stripe_client = state.stripe_client.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("Payment processing is not configured".to_string())
    })?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing Stripe-Signature header".to_string()))?;

    let event = stripe_client.construct_event(&body, signature)?;

    state
        .service_context
        .webhook_service
        .handle_event(event)
        .await?;

    Ok(Json(json!({ "received": true })))
}
