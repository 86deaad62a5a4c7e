use async_trait::async_trait;
use chrono::{Duration, Utc};
use stripe::{
    CheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, Currency, Webhook, WebhookError,
};

use crate::{
    error::{AppError, Result},
    payments::{BookingCheckout, CheckoutGateway, CheckoutSessionInfo},
};

pub struct StripeClient {
    client: Client,
    webhook_secret: String,
}

impl StripeClient {
    pub fn new(api_key: String, webhook_secret: String) -> Self {
        let client = Client::new(api_key);
        Self {
            client,
            webhook_secret,
        }
    }

    /// Verify the webhook signature and deserialize the event. A bad
    /// signature is a 400, never processed: Stripe will not retry a 400 and
    /// an unverifiable payload must not be retried.
    pub fn construct_event(&self, payload: &str, stripe_signature: &str) -> Result<stripe::Event> {
        Webhook::construct_event(payload, stripe_signature, &self.webhook_secret).map_err(|e| {
            match e {
                WebhookError::BadSignature => {
                    AppError::BadRequest("Invalid signature".to_string())
                }
                _ => AppError::BadRequest(format!("Webhook error: {}", e)),
            }
        })
    }
}

#[async_trait]
impl CheckoutGateway for StripeClient {
    async fn create_booking_session(&self, booking: &BookingCheckout) -> Result<CheckoutSessionInfo> {
        // Create checkout session with inline price data
        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Payment);
        params.success_url = Some(&booking.success_url);
        params.cancel_url = Some(&booking.cancel_url);

        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price_data: Some(stripe::CreateCheckoutSessionLineItemsPriceData {
                currency: Currency::USD,
                unit_amount: Some(booking.amount_cents),
                product_data: Some(stripe::CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: booking.instrument_title.clone(),
                    description: Some(format!("{}-night rental", booking.nights)),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            quantity: Some(1),
            ..Default::default()
        }]);

        // Stripe enforces a 30-minute floor on session expiry, so a short
        // reservation hold cannot be mirrored exactly; the hold sweeper is
        // the authoritative timeout either way.
        let min_expiry = Utc::now() + Duration::minutes(30);
        params.expires_at = Some(booking.expires_at.max(min_expiry).timestamp());

        // The metadata round-trips through Stripe and is the reconciler's
        // only correlation back to our records.
        params.metadata = Some(booking.metadata.clone());
        if let Some(reservation_id) = booking.metadata.get("reservation_id") {
            params.client_reference_id = Some(reservation_id);
        }

        let session = CheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| AppError::External(format!("Stripe error: {}", e)))?;

        let url = session
            .url
            .ok_or_else(|| AppError::External("No checkout URL returned".to_string()))?;

        Ok(CheckoutSessionInfo {
            session_id: session.id.to_string(),
            url,
        })
    }
}
