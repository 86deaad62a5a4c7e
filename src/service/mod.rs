pub mod cancellation_service;
pub mod checkout_service;
pub mod hold_service;
pub mod sweep_service;
pub mod webhook_service;

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::auth::AuthService;
use crate::config::BookingConfig;
use crate::notifications::Mailer;
use crate::payments::CheckoutGateway;
use crate::repository::*;

pub use cancellation_service::CancellationService;
pub use checkout_service::{CheckoutRequest, CheckoutService};
pub use hold_service::HoldService;
pub use sweep_service::SweepService;
pub use webhook_service::{SessionMetadata, WebhookService};

pub struct ServiceContext {
    pub reservation_repo: Arc<dyn ReservationRepository>,
    pub payment_repo: Arc<dyn PaymentRepository>,
    pub instrument_repo: Arc<dyn InstrumentRepository>,
    pub user_repo: Arc<dyn UserRepository>,
    pub auth_service: Arc<AuthService>,
    pub hold_service: Arc<HoldService>,
    /// None when no payment gateway is configured; checkout is refused
    /// with a 503 in that case.
    pub checkout_service: Option<Arc<CheckoutService>>,
    pub webhook_service: Arc<WebhookService>,
    pub cancellation_service: Arc<CancellationService>,
    pub sweep_service: Arc<SweepService>,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reservation_repo: Arc<dyn ReservationRepository>,
        payment_repo: Arc<dyn PaymentRepository>,
        instrument_repo: Arc<dyn InstrumentRepository>,
        user_repo: Arc<dyn UserRepository>,
        auth_service: Arc<AuthService>,
        gateway: Option<Arc<dyn CheckoutGateway>>,
        mailer: Option<Arc<Mailer>>,
        booking: &BookingConfig,
        base_url: String,
        db_pool: SqlitePool,
    ) -> Self {
        let hold_service = Arc::new(HoldService::new(
            reservation_repo.clone(),
            instrument_repo.clone(),
            booking.hold_duration_minutes,
        ));

        let checkout_service = gateway.map(|gateway| {
            Arc::new(CheckoutService::new(
                hold_service.clone(),
                reservation_repo.clone(),
                payment_repo.clone(),
                instrument_repo.clone(),
                gateway,
                base_url,
            ))
        });

        let webhook_service = Arc::new(WebhookService::new(
            reservation_repo.clone(),
            payment_repo.clone(),
            instrument_repo.clone(),
            user_repo.clone(),
            mailer.clone(),
        ));

        let cancellation_service = Arc::new(CancellationService::new(
            reservation_repo.clone(),
            instrument_repo.clone(),
            user_repo.clone(),
            mailer,
        ));

        let sweep_service = Arc::new(SweepService::new(reservation_repo.clone()));

        Self {
            reservation_repo,
            payment_repo,
            instrument_repo,
            user_repo,
            auth_service,
            hold_service,
            checkout_service,
            webhook_service,
            cancellation_service,
            sweep_service,
            db_pool,
        }
    }
}
