use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A booking of an instrument for an inclusive date range.
///
/// A reservation starts life as a `Pending` hold with an expiry deadline and
/// only becomes `Active` once the payment processor confirms the linked
/// checkout session. `Canceled` and `Completed` are terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: Uuid,
    pub instrument_id: Uuid,
    pub renter_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_price_cents: i64,
    pub status: ReservationStatus,
    /// Set only while `Pending`; cleared on every transition out of it.
    pub expires_at: Option<DateTime<Utc>>,
    /// Correlation key to the payment processor's checkout session. Unique
    /// per session once linked.
    pub external_session_id: Option<String>,
    pub pickup_address: String,
    pub pickup_at: Option<DateTime<Utc>>,
    pub return_at: Option<DateTime<Utc>>,
    pub pickup_confirmed: bool,
    pub return_confirmed: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub canceled_by: Option<Uuid>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReservationStatus {
    Pending,
    Active,
    Completed,
    Canceled,
}

impl ReservationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::Completed | ReservationStatus::Canceled)
    }
}

/// Everything the hold manager has resolved by the time a pending
/// reservation is inserted. The repository re-runs the conflict check
/// inside the insert transaction, so this carries no proof of availability.
#[derive(Debug, Clone)]
pub struct NewHold {
    pub instrument_id: Uuid,
    pub renter_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_price_cents: i64,
    pub expires_at: DateTime<Utc>,
    pub pickup_address: String,
    pub pickup_at: Option<DateTime<Utc>>,
    pub return_at: Option<DateTime<Utc>>,
}

/// Inclusive overlap between two date ranges.
///
/// Covers partial overlap in either direction and full containment both
/// ways: `[s1,e1]` and `[s2,e2]` conflict iff `s1 <= e2 && s2 <= e1`.
pub fn ranges_overlap(s1: NaiveDate, e1: NaiveDate, s2: NaiveDate, e2: NaiveDate) -> bool {
    s1 <= e2 && s2 <= e1
}

/// Number of billable nights for an inclusive date range. `start == end`
/// would be zero nights and is rejected upstream as a validation error.
pub fn rental_nights(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn overlap_covers_partial_and_containment() {
        // partial, new range starts inside existing
        assert!(ranges_overlap(d("2024-01-01"), d("2024-01-07"), d("2024-01-05"), d("2024-01-10")));
        // partial, new range ends inside existing
        assert!(ranges_overlap(d("2024-01-05"), d("2024-01-10"), d("2024-01-01"), d("2024-01-07")));
        // new range fully contains existing
        assert!(ranges_overlap(d("2024-01-03"), d("2024-01-04"), d("2024-01-01"), d("2024-01-10")));
        // existing fully contains new
        assert!(ranges_overlap(d("2024-01-01"), d("2024-01-10"), d("2024-01-03"), d("2024-01-04")));
        // touching endpoints count as a conflict (inclusive ranges)
        assert!(ranges_overlap(d("2024-01-01"), d("2024-01-05"), d("2024-01-05"), d("2024-01-08")));
    }

    #[test]
    fn disjoint_ranges_do_not_overlap() {
        assert!(!ranges_overlap(d("2024-01-01"), d("2024-01-04"), d("2024-01-05"), d("2024-01-08")));
        assert!(!ranges_overlap(d("2024-01-05"), d("2024-01-08"), d("2024-01-01"), d("2024-01-04")));
    }

    #[test]
    fn overlap_matches_brute_force_oracle() {
        let mut rng = rand::thread_rng();
        let base = d("2024-01-01");

        for _ in 0..1000 {
            let s1 = base + chrono::Duration::days(rng.gen_range(0..60));
            let e1 = s1 + chrono::Duration::days(rng.gen_range(0..14));
            let s2 = base + chrono::Duration::days(rng.gen_range(0..60));
            let e2 = s2 + chrono::Duration::days(rng.gen_range(0..14));

            // Oracle: walk every day of range 1 and see whether it falls
            // inside range 2.
            let mut expected = false;
            let mut day = s1;
            while day <= e1 {
                if day >= s2 && day <= e2 {
                    expected = true;
                    break;
                }
                day += chrono::Duration::days(1);
            }

            assert_eq!(
                ranges_overlap(s1, e1, s2, e2),
                expected,
                "mismatch for [{s1},{e1}] vs [{s2},{e2}]"
            );
        }
    }

    #[test]
    fn nights_are_exclusive_of_the_return_day() {
        assert_eq!(rental_nights(d("2024-01-01"), d("2024-01-07")), 6);
        assert_eq!(rental_nights(d("2024-01-01"), d("2024-01-02")), 1);
        assert_eq!(rental_nights(d("2024-01-01"), d("2024-01-01")), 0);
    }
}
