use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{NewHold, Reservation},
    error::{AppError, Result},
    repository::{InstrumentRepository, ReservationRepository},
};

/// Creates time-limited pending reservations. A hold blocks the calendar
/// until payment completes or the hold expires.
pub struct HoldService {
    reservations: Arc<dyn ReservationRepository>,
    instruments: Arc<dyn InstrumentRepository>,
    hold_duration_minutes: i64,
}

impl HoldService {
    pub fn new(
        reservations: Arc<dyn ReservationRepository>,
        instruments: Arc<dyn InstrumentRepository>,
        hold_duration_minutes: i64,
    ) -> Self {
        Self {
            reservations,
            instruments,
            hold_duration_minutes,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_hold(
        &self,
        renter_id: Uuid,
        instrument_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        total_price_cents: i64,
        pickup_time: Option<&str>,
        return_time: Option<&str>,
    ) -> Result<Reservation> {
        if end_date <= start_date {
            return Err(AppError::Validation(
                "Return date must be after the start date".to_string(),
            ));
        }

        let instrument = self
            .instruments
            .find_by_id(instrument_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Instrument not found".to_string()))?;

        // Advisory pre-check, deliberately outside any transaction so the
        // instrument lookup above never holds one open. The repository
        // re-runs the same check inside the insert transaction; that one is
        // authoritative.
        if self
            .reservations
            .has_conflict(instrument_id, start_date, end_date, None)
            .await?
        {
            return Err(AppError::Conflict(
                "The selected dates are no longer available".to_string(),
            ));
        }

        let expires_at = Utc::now() + Duration::minutes(self.hold_duration_minutes);

        self.reservations
            .create_hold(NewHold {
                instrument_id,
                renter_id,
                start_date,
                end_date,
                total_price_cents,
                expires_at,
                pickup_address: instrument.default_address.clone(),
                pickup_at: combine_date_time(start_date, pickup_time)?,
                return_at: combine_date_time(end_date, return_time)?,
            })
            .await
    }
}

/// Merge a date-only booking boundary with an optional `HH:MM` time of day.
fn combine_date_time(date: NaiveDate, time: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    let Some(time) = time else {
        return Ok(None);
    };

    let time = NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|_| AppError::Validation(format!("Invalid time of day: {}", time)))?;

    Ok(Some(DateTime::from_naive_utc_and_offset(
        date.and_time(time),
        Utc,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combines_date_with_time_of_day() {
        let date = NaiveDate::parse_from_str("2024-01-05", "%Y-%m-%d").unwrap();
        let dt = combine_date_time(date, Some("14:30")).unwrap().unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-05T14:30:00+00:00");
    }

    #[test]
    fn missing_time_is_none() {
        let date = NaiveDate::parse_from_str("2024-01-05", "%Y-%m-%d").unwrap();
        assert!(combine_date_time(date, None).unwrap().is_none());
    }

    #[test]
    fn malformed_time_is_a_validation_error() {
        let date = NaiveDate::parse_from_str("2024-01-05", "%Y-%m-%d").unwrap();
        assert!(matches!(
            combine_date_time(date, Some("2pm")),
            Err(AppError::Validation(_))
        ));
    }
}
