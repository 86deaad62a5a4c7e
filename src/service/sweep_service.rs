use chrono::Utc;
use std::sync::Arc;

use crate::{error::Result, repository::ReservationRepository};

/// Reclaims pending holds whose expiry has passed. Invoked by an external
/// scheduler; safe to run at any cadence since conflict detection already
/// ignores expired holds, so this is data hygiene plus observability.
pub struct SweepService {
    reservations: Arc<dyn ReservationRepository>,
}

impl SweepService {
    pub fn new(reservations: Arc<dyn ReservationRepository>) -> Self {
        Self { reservations }
    }

    /// Returns the number of holds transitioned; a repeat run with nothing
    /// newly expired returns zero.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let count = self.reservations.sweep_expired(Utc::now()).await?;

        if count > 0 {
            tracing::info!("Expired {} reservation hold(s)", count);
        }

        Ok(count)
    }
}
