use std::collections::HashMap;
use std::sync::Arc;
use stripe::{EventObject, EventType};
use uuid::Uuid;

use crate::{
    domain::{PaymentStatus, Reservation},
    error::Result,
    notifications::{send_best_effort, Mailer},
    repository::{
        CheckoutCompletion, InstrumentRepository, PaymentRepository, ReservationRepository,
        UserRepository,
    },
};

/// Correlation keys carried in the checkout session's metadata. They are
/// the only link between an inbound event and our records; events without
/// them cannot be reconciled and are dropped with a warning.
#[derive(Debug, Clone, Copy)]
pub struct SessionMetadata {
    pub payment_id: Uuid,
    pub reservation_id: Uuid,
}

impl SessionMetadata {
    pub fn from_map(map: Option<&HashMap<String, String>>) -> Option<Self> {
        let map = map?;
        let payment_id = Uuid::parse_str(map.get("payment_id")?).ok()?;
        let reservation_id = Uuid::parse_str(map.get("reservation_id")?).ok()?;
        Some(Self {
            payment_id,
            reservation_id,
        })
    }
}

/// Consumes payment-processor events and brings {payment, reservation}
/// state into agreement.
///
/// Delivery is at-least-once and unordered: the same event can arrive
/// twice, and a `completed` can arrive for a hold the sweeper already
/// reclaimed. Every transition therefore runs behind precondition checks
/// inside a single transaction (see the reservation repository), and a
/// redelivery of something fully applied is success, not an error.
pub struct WebhookService {
    reservations: Arc<dyn ReservationRepository>,
    payments: Arc<dyn PaymentRepository>,
    instruments: Arc<dyn InstrumentRepository>,
    users: Arc<dyn UserRepository>,
    mailer: Option<Arc<Mailer>>,
}

impl WebhookService {
    pub fn new(
        reservations: Arc<dyn ReservationRepository>,
        payments: Arc<dyn PaymentRepository>,
        instruments: Arc<dyn InstrumentRepository>,
        users: Arc<dyn UserRepository>,
        mailer: Option<Arc<Mailer>>,
    ) -> Self {
        Self {
            reservations,
            payments,
            instruments,
            users,
            mailer,
        }
    }

    /// Dispatch one verified event. Errors returned here become a 500 on
    /// the webhook endpoint, which is exactly what makes the processor
    /// retry later.
    pub async fn handle_event(&self, event: stripe::Event) -> Result<()> {
        match event.type_ {
            EventType::CheckoutSessionCompleted => {
                if let EventObject::CheckoutSession(session) = event.data.object {
                    let session_id = session.id.to_string();
                    let Some(meta) = SessionMetadata::from_map(session.metadata.as_ref()) else {
                        tracing::warn!(
                            "checkout.session.completed without booking metadata: {}",
                            session_id
                        );
                        return Ok(());
                    };
                    self.reconcile_completed(&meta, &session_id).await?;
                }
            }
            EventType::CheckoutSessionExpired => {
                if let EventObject::CheckoutSession(session) = event.data.object {
                    let Some(meta) = SessionMetadata::from_map(session.metadata.as_ref()) else {
                        return Ok(());
                    };
                    self.reconcile_expired(&meta).await?;
                }
            }
            other => {
                tracing::debug!("Unhandled webhook event type: {:?}", other);
            }
        }

        Ok(())
    }

    /// Apply a successful checkout: payment -> Succeeded, reservation ->
    /// Active. Idempotent; a second delivery for an already-succeeded
    /// payment is a no-op success.
    pub async fn reconcile_completed(
        &self,
        meta: &SessionMetadata,
        session_id: &str,
    ) -> Result<()> {
        let Some(payment) = self.payments.find_by_id(meta.payment_id).await? else {
            tracing::warn!("No payment record for completed session {}", session_id);
            return Ok(());
        };

        // Idempotency gate: a succeeded payment is never reprocessed.
        if payment.status == PaymentStatus::Succeeded {
            tracing::info!("Duplicate completion for session {}, ignoring", session_id);
            return Ok(());
        }

        match self
            .reservations
            .complete_checkout(meta.reservation_id, meta.payment_id, session_id)
            .await?
        {
            CheckoutCompletion::Activated(reservation) => {
                tracing::info!(
                    "Reservation {} activated by session {}",
                    reservation.id,
                    session_id
                );
                self.notify_activation(&reservation).await;
            }
            CheckoutCompletion::DuplicateDelivery => {
                tracing::info!("Duplicate completion for session {}, ignoring", session_id);
            }
            CheckoutCompletion::ReservationGone => {
                tracing::warn!(
                    "Completed session {} references reservation {} which no longer exists",
                    session_id,
                    meta.reservation_id
                );
            }
        }

        Ok(())
    }

    /// Apply an expired checkout session: both records -> Canceled. The
    /// repository's `Pending` preconditions make a late or duplicate
    /// expiry harmless.
    pub async fn reconcile_expired(&self, meta: &SessionMetadata) -> Result<()> {
        self.reservations
            .expire_checkout(meta.reservation_id, meta.payment_id)
            .await?;

        tracing::info!(
            "Checkout session expired for reservation {}",
            meta.reservation_id
        );

        Ok(())
    }

    /// Post-commit, best-effort booking confirmations. A mail failure must
    /// never fail the webhook response; the processor only cares that the
    /// state transition committed.
    async fn notify_activation(&self, reservation: &Reservation) {
        let instrument = match self.instruments.find_by_id(reservation.instrument_id).await {
            Ok(Some(instrument)) => instrument,
            _ => {
                tracing::warn!(
                    "Skipping confirmation emails, instrument {} not found",
                    reservation.instrument_id
                );
                return;
            }
        };

        if let Ok(Some(renter)) = self.users.find_by_id(reservation.renter_id).await {
            send_best_effort(
                self.mailer.clone(),
                renter.email,
                format!("Your rental of {} is confirmed", instrument.title),
                format!(
                    "<p>Your booking from {} to {} is confirmed. Pickup at: {}</p>",
                    reservation.start_date, reservation.end_date, reservation.pickup_address
                ),
            );
        }

        if let Ok(Some(owner)) = self.users.find_by_id(instrument.owner_id).await {
            send_best_effort(
                self.mailer.clone(),
                owner.email,
                format!("{} was booked", instrument.title),
                format!(
                    "<p>Your instrument was booked from {} to {}.</p>",
                    reservation.start_date, reservation.end_date
                ),
            );
        }
    }
}
