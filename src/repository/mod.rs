use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::*;
use crate::error::Result;

pub mod instrument_repository;
pub mod payment_repository;
pub mod reservation_repository;
pub mod user_repository;

pub use instrument_repository::SqliteInstrumentRepository;
pub use payment_repository::SqlitePaymentRepository;
pub use reservation_repository::SqliteReservationRepository;
pub use user_repository::SqliteUserRepository;

/// Outcome of applying a `checkout.session.completed` event inside one
/// transaction. Anything not representable here (an active reservation
/// linked to a *different* session, a completed one, ...) is surfaced as an
/// error so the processor retries instead of us overwriting state.
#[derive(Debug)]
pub enum CheckoutCompletion {
    Activated(Reservation),
    /// Reservation already active under the same session id: the processor
    /// redelivered an event we have fully applied.
    DuplicateDelivery,
    /// Reservation no longer exists; it was cleaned up before the event
    /// arrived and there is nothing to transition.
    ReservationGone,
}

/// Store for reservations, including every multi-record transaction that
/// touches the payments table alongside. Cross-record mutations live here
/// rather than being stitched together in services so that each one is a
/// single sqlx transaction with its status preconditions.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Insert a pending hold, re-running the conflict check inside the
    /// insert transaction. Returns `AppError::Conflict` when the dates were
    /// taken between the advisory check and the insert.
    async fn create_hold(&self, hold: NewHold) -> Result<Reservation>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Reservation>>;

    /// Reservation together with the owning user of its instrument, for
    /// cancellation authorization.
    async fn find_with_owner(&self, id: Uuid) -> Result<Option<(Reservation, Uuid)>>;

    /// Whether any blocking reservation overlaps [start, end] (inclusive)
    /// for the instrument. Blocking means `Active`, or `Pending` with an
    /// expiry still in the future; expired-but-unswept holds never block.
    async fn has_conflict(
        &self,
        instrument_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        exclude: Option<Uuid>,
    ) -> Result<bool>;

    /// Bulk-cancel pending holds whose expiry has passed. Idempotent;
    /// returns the number of rows transitioned.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Stamp the checkout session id onto both the reservation and the
    /// payment in one transaction (the link step of the create-before-link
    /// protocol).
    async fn link_session(
        &self,
        reservation_id: Uuid,
        payment_id: Uuid,
        session_id: &str,
    ) -> Result<()>;

    /// Apply a successful checkout: payment -> Succeeded, reservation ->
    /// Active, both stamped with the session id, in one transaction.
    async fn complete_checkout(
        &self,
        reservation_id: Uuid,
        payment_id: Uuid,
        session_id: &str,
    ) -> Result<CheckoutCompletion>;

    /// Apply an expired checkout session: both records -> Canceled, guarded
    /// by `Pending` preconditions so a late event cannot undo an earlier
    /// completion.
    async fn expire_checkout(&self, reservation_id: Uuid, payment_id: Uuid) -> Result<()>;

    /// User-initiated cancellation; syncs the linked payment in the same
    /// transaction. Fails with `InvalidState` when the reservation is
    /// already terminal.
    async fn cancel(&self, id: Uuid, canceled_by: Uuid, reason: &str) -> Result<Reservation>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create(&self, payment: NewPayment) -> Result<Payment>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>>;
    async fn find_by_session(&self, session_id: &str) -> Result<Option<Payment>>;
}

#[async_trait]
pub trait InstrumentRepository: Send + Sync {
    async fn create(&self, instrument: Instrument) -> Result<Instrument>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Instrument>>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: User) -> Result<User>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
}
