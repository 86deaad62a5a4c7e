pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{config::Settings, payments::StripeClient, service::ServiceContext};
use state::AppState;

pub fn create_app(
    service_context: Arc<ServiceContext>,
    stripe_client: Option<Arc<StripeClient>>,
    settings: Arc<Settings>,
) -> Router {
    let app_state = AppState::new(service_context, stripe_client, settings);

    Router::new()
        // Root and health endpoints
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))
        // Processor webhook (signature-verified, no session auth)
        .route("/webhooks/payment", post(handlers::webhooks::payment_webhook))
        // Scheduler entry point (bearer-token gated)
        .route(
            "/cron/expire-reservations",
            get(handlers::cron::expire_reservations),
        )
        // Authenticated booking API
        .nest("/api", api_routes(app_state.clone()))
        // Add state to the router
        .with_state(app_state)
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive()) // Configure properly for production
        .layer(TraceLayer::new_for_http())
}

fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/checkout", post(handlers::checkout::begin_checkout))
        .route("/reservations/:id", get(handlers::reservations::get))
        .route(
            "/reservations/:id/cancel",
            post(handlers::reservations::cancel),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_auth,
        ))
}
