use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::Result;

pub mod stripe_client;

pub use stripe_client::StripeClient;

/// What the checkout bridge needs back from the processor to link records
/// and redirect the client.
#[derive(Debug, Clone)]
pub struct CheckoutSessionInfo {
    pub session_id: String,
    pub url: String,
}

/// One hosted-checkout request. The metadata map travels to the processor
/// and comes back verbatim on webhook events; it is the only correlation
/// mechanism the reconciler has.
#[derive(Debug, Clone)]
pub struct BookingCheckout {
    pub instrument_title: String,
    pub amount_cents: i64,
    pub nights: i64,
    pub metadata: HashMap<String, String>,
    pub success_url: String,
    pub cancel_url: String,
    /// Aligned with the reservation hold expiry so the hosted page dies
    /// when the hold does.
    pub expires_at: DateTime<Utc>,
}

/// Seam to the payment processor's hosted checkout. Production uses
/// [`StripeClient`]; tests substitute a stub so no network is involved.
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn create_booking_session(&self, booking: &BookingCheckout) -> Result<CheckoutSessionInfo>;
}
