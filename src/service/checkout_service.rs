use chrono::{Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{rental_nights, NewPayment},
    error::{AppError, Result},
    payments::{BookingCheckout, CheckoutGateway, CheckoutSessionInfo},
    repository::{InstrumentRepository, PaymentRepository, ReservationRepository},
    service::HoldService,
};

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub instrument_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_price_cents: i64,
    pub pickup_time: Option<String>,
    pub return_time: Option<String>,
}

/// Bridges a reservation hold to a hosted payment session.
///
/// Creation order is deliberate: hold, then payment (both unlinked), then
/// the external session, then one transaction stamping the session id onto
/// both rows. Neither record references the other directly because the
/// session they correlate on does not exist when they are created.
pub struct CheckoutService {
    holds: Arc<HoldService>,
    reservations: Arc<dyn ReservationRepository>,
    payments: Arc<dyn PaymentRepository>,
    instruments: Arc<dyn InstrumentRepository>,
    gateway: Arc<dyn CheckoutGateway>,
    base_url: String,
}

impl CheckoutService {
    pub fn new(
        holds: Arc<HoldService>,
        reservations: Arc<dyn ReservationRepository>,
        payments: Arc<dyn PaymentRepository>,
        instruments: Arc<dyn InstrumentRepository>,
        gateway: Arc<dyn CheckoutGateway>,
        base_url: String,
    ) -> Self {
        Self {
            holds,
            reservations,
            payments,
            instruments,
            gateway,
            base_url,
        }
    }

    pub async fn begin_checkout(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CheckoutSessionInfo> {
        let instrument = self
            .instruments
            .find_by_id(request.instrument_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Instrument not found".to_string()))?;

        if instrument.owner_id == user_id {
            return Err(AppError::Validation(
                "You cannot book your own instrument".to_string(),
            ));
        }

        let nights = rental_nights(request.start_date, request.end_date);
        if nights <= 0 {
            return Err(AppError::Validation(
                "Return date must be after the start date".to_string(),
            ));
        }

        // The client-supplied total is only ever compared against our own
        // quote; amounts are integer cents so the comparison is exact.
        let expected_cents = instrument.daily_rate_cents * nights;
        if request.total_price_cents != expected_cents {
            return Err(AppError::Validation(
                "Quoted price does not match the current rate".to_string(),
            ));
        }

        let reservation = self
            .holds
            .create_hold(
                user_id,
                request.instrument_id,
                request.start_date,
                request.end_date,
                expected_cents,
                request.pickup_time.as_deref(),
                request.return_time.as_deref(),
            )
            .await?;

        let payment = self
            .payments
            .create(NewPayment {
                user_id,
                instrument_id: request.instrument_id,
                amount_cents: expected_cents,
                currency: "USD".to_string(),
                start_date: request.start_date,
                end_date: request.end_date,
            })
            .await?;

        let mut metadata = HashMap::new();
        metadata.insert("payment_id".to_string(), payment.id.to_string());
        metadata.insert("reservation_id".to_string(), reservation.id.to_string());
        metadata.insert("instrument_id".to_string(), instrument.id.to_string());
        metadata.insert("user_id".to_string(), user_id.to_string());
        metadata.insert("start_date".to_string(), request.start_date.to_string());
        metadata.insert("end_date".to_string(), request.end_date.to_string());
        if let Some(ref pickup_time) = request.pickup_time {
            metadata.insert("pickup_time".to_string(), pickup_time.clone());
        }
        if let Some(ref return_time) = request.return_time {
            metadata.insert("return_time".to_string(), return_time.clone());
        }

        // If the processor call below fails we are left with an unlinked
        // pending hold and payment. That is fine: the hold expires and the
        // sweeper reclaims the dates, so no compensating delete is needed.
        let session = self
            .gateway
            .create_booking_session(&BookingCheckout {
                instrument_title: instrument.title.clone(),
                amount_cents: expected_cents,
                nights,
                metadata,
                success_url: format!(
                    "{}/bookings/success?reservation={}",
                    self.base_url, reservation.id
                ),
                cancel_url: format!("{}/instruments/{}", self.base_url, instrument.id),
                expires_at: reservation
                    .expires_at
                    .unwrap_or_else(|| Utc::now() + Duration::minutes(15)),
            })
            .await?;

        self.reservations
            .link_session(reservation.id, payment.id, &session.session_id)
            .await?;

        tracing::info!(
            "Opened checkout session {} for reservation {}",
            session.session_id,
            reservation.id
        );

        Ok(session)
    }
}
