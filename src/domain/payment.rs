use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payment record mirroring one checkout attempt.
///
/// Deliberately not foreign-keyed to the reservation: both rows exist before
/// the processor session does, so they are correlated by
/// `external_session_id` plus the (user, instrument, window) tuple instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub instrument_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    /// Empty string until the checkout session is created, then immutable.
    pub external_session_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Canceled,
    Failed,
}

/// Fields the checkout bridge supplies when opening a payment attempt.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: Uuid,
    pub instrument_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}
