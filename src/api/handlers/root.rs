use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Fermata API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Booking and payment engine for instrument rentals",
        "status": "operational",
        "endpoints": {
            "health": "/health",
            "checkout": "/api/checkout",
            "webhooks": "/webhooks/payment"
        }
    }))
}

pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}
