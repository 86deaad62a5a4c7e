use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The rented resource. Listing CRUD lives outside this core; the booking
/// engine only ever reads these fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub daily_rate_cents: i64,
    pub default_address: String,
    pub created_at: DateTime<Utc>,
}
