use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{Reservation, ReservationStatus},
    error::{AppError, Result},
    notifications::{send_best_effort, Mailer},
    repository::{InstrumentRepository, ReservationRepository, UserRepository},
};

const DEFAULT_REASON: &str = "Canceled by user";

/// Terminal-state transition usable by either party to the booking.
/// Payments are non-refundable; cancellation syncs the linked payment
/// record but never reaches back out to the processor.
pub struct CancellationService {
    reservations: Arc<dyn ReservationRepository>,
    instruments: Arc<dyn InstrumentRepository>,
    users: Arc<dyn UserRepository>,
    mailer: Option<Arc<Mailer>>,
}

impl CancellationService {
    pub fn new(
        reservations: Arc<dyn ReservationRepository>,
        instruments: Arc<dyn InstrumentRepository>,
        users: Arc<dyn UserRepository>,
        mailer: Option<Arc<Mailer>>,
    ) -> Self {
        Self {
            reservations,
            instruments,
            users,
            mailer,
        }
    }

    pub async fn cancel(
        &self,
        reservation_id: Uuid,
        acting_user_id: Uuid,
        reason: Option<String>,
    ) -> Result<Reservation> {
        let (reservation, owner_id) = self
            .reservations
            .find_with_owner(reservation_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Reservation not found".to_string()))?;

        if acting_user_id != reservation.renter_id && acting_user_id != owner_id {
            return Err(AppError::Forbidden);
        }

        match reservation.status {
            ReservationStatus::Canceled => {
                return Err(AppError::InvalidState(
                    "Reservation has already been canceled".to_string(),
                ));
            }
            ReservationStatus::Completed => {
                return Err(AppError::InvalidState(
                    "Completed reservations cannot be canceled".to_string(),
                ));
            }
            ReservationStatus::Pending | ReservationStatus::Active => {}
        }

        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REASON.to_string());

        // The repository re-checks the status precondition inside its
        // transaction, so a concurrent cancel or completion cannot
        // double-stamp the record.
        let updated = self
            .reservations
            .cancel(reservation_id, acting_user_id, &reason)
            .await?;

        tracing::info!(
            "Reservation {} canceled by user {}",
            reservation_id,
            acting_user_id
        );

        self.notify_cancellation(&updated, acting_user_id, owner_id).await;

        Ok(updated)
    }

    /// Post-commit, best-effort note to the party who didn't cancel.
    async fn notify_cancellation(
        &self,
        reservation: &Reservation,
        acting_user_id: Uuid,
        owner_id: Uuid,
    ) {
        let other_party = if acting_user_id == reservation.renter_id {
            owner_id
        } else {
            reservation.renter_id
        };

        let title = match self.instruments.find_by_id(reservation.instrument_id).await {
            Ok(Some(instrument)) => instrument.title,
            _ => "your booking".to_string(),
        };

        if let Ok(Some(user)) = self.users.find_by_id(other_party).await {
            send_best_effort(
                self.mailer.clone(),
                user.email,
                format!("Booking of {} was canceled", title),
                format!(
                    "<p>The booking from {} to {} has been canceled.</p>",
                    reservation.start_date, reservation.end_date
                ),
            );
        }
    }
}
