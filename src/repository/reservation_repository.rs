use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{NewHold, Reservation, ReservationStatus},
    error::{AppError, Result},
    repository::{CheckoutCompletion, ReservationRepository},
};

#[derive(FromRow)]
struct ReservationRow {
    id: String,
    instrument_id: String,
    renter_id: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    total_price_cents: i64,
    status: String,
    expires_at: Option<NaiveDateTime>,
    external_session_id: Option<String>,
    pickup_address: String,
    pickup_at: Option<NaiveDateTime>,
    return_at: Option<NaiveDateTime>,
    pickup_confirmed: bool,
    return_confirmed: bool,
    canceled_at: Option<NaiveDateTime>,
    canceled_by: Option<String>,
    cancellation_reason: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const RESERVATION_COLUMNS: &str = r#"id, instrument_id, renter_id, start_date, end_date,
       total_price_cents, status, expires_at, external_session_id,
       pickup_address, pickup_at, return_at, pickup_confirmed, return_confirmed,
       canceled_at, canceled_by, cancellation_reason, created_at, updated_at"#;

// A reservation blocks the calendar while Active, or while Pending with an
// expiry still in the future. Expired-but-unswept holds are treated as
// already canceled here so availability never depends on sweep cadence.
const CONFLICT_COUNT_SQL: &str = r#"
    SELECT COUNT(*) FROM reservations
    WHERE instrument_id = ?
      AND (? IS NULL OR id != ?)
      AND (status = 'Active' OR (status = 'Pending' AND expires_at > ?))
      AND start_date <= ? AND end_date >= ?
"#;

pub struct SqliteReservationRepository {
    pool: SqlitePool,
}

impl SqliteReservationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_reservation(row: ReservationRow) -> Result<Reservation> {
        let canceled_by = match row.canceled_by {
            Some(ref s) => {
                Some(Uuid::parse_str(s).map_err(|e| AppError::Database(e.to_string()))?)
            }
            None => None,
        };

        Ok(Reservation {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            instrument_id: Uuid::parse_str(&row.instrument_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            renter_id: Uuid::parse_str(&row.renter_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            start_date: row.start_date,
            end_date: row.end_date,
            total_price_cents: row.total_price_cents,
            status: Self::parse_status(&row.status)?,
            expires_at: row.expires_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            external_session_id: row.external_session_id,
            pickup_address: row.pickup_address,
            pickup_at: row.pickup_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            return_at: row.return_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            pickup_confirmed: row.pickup_confirmed,
            return_confirmed: row.return_confirmed,
            canceled_at: row.canceled_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            canceled_by,
            cancellation_reason: row.cancellation_reason,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    fn parse_status(s: &str) -> Result<ReservationStatus> {
        match s {
            "Pending" => Ok(ReservationStatus::Pending),
            "Active" => Ok(ReservationStatus::Active),
            "Completed" => Ok(ReservationStatus::Completed),
            "Canceled" => Ok(ReservationStatus::Canceled),
            _ => Err(AppError::Database(format!("Invalid reservation status: {}", s))),
        }
    }

    /// Runs under a write transaction already holding SQLite's write lock.
    /// The conflict count here is authoritative: the advisory check in the
    /// hold manager ran outside any transaction, so a concurrent checkout may
    /// have claimed the dates since.
    async fn insert_hold(conn: &mut SqliteConnection, hold: &NewHold) -> Result<Uuid> {
        let now_naive = Utc::now().naive_utc();
        let exclude: Option<String> = None;

        let conflicts: i64 = sqlx::query_scalar(CONFLICT_COUNT_SQL)
            .bind(hold.instrument_id.to_string())
            .bind(&exclude)
            .bind(&exclude)
            .bind(now_naive)
            .bind(hold.end_date)
            .bind(hold.start_date)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if conflicts > 0 {
            return Err(AppError::Conflict(
                "The selected dates are no longer available".to_string(),
            ));
        }

        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO reservations (
                id, instrument_id, renter_id, start_date, end_date,
                total_price_cents, status, expires_at, external_session_id,
                pickup_address, pickup_at, return_at,
                pickup_confirmed, return_confirmed,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, 'Pending', ?, NULL, ?, ?, ?, 0, 0, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(hold.instrument_id.to_string())
        .bind(hold.renter_id.to_string())
        .bind(hold.start_date)
        .bind(hold.end_date)
        .bind(hold.total_price_cents)
        .bind(hold.expires_at.naive_utc())
        .bind(&hold.pickup_address)
        .bind(hold.pickup_at.map(|dt| dt.naive_utc()))
        .bind(hold.return_at.map(|dt| dt.naive_utc()))
        .bind(now_naive)
        .bind(now_naive)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(id)
    }
}

#[async_trait]
impl ReservationRepository for SqliteReservationRepository {
    async fn create_hold(&self, hold: NewHold) -> Result<Reservation> {
        // BEGIN IMMEDIATE acquires the write lock before the conflict count
        // runs. Racing holds therefore serialize on the lock: the loser
        // waits, then sees the winner's committed row and reports a conflict
        // instead of failing with a busy error mid-transaction.
        let mut conn = self.pool.acquire().await?;

        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let id = match Self::insert_hold(&mut conn, &hold).await {
            Ok(id) => id,
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        };

        if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            return Err(AppError::Database(e.to_string()));
        }
        drop(conn);

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created reservation".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Reservation>> {
        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM reservations WHERE id = ?",
            RESERVATION_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_reservation(r)?)),
            None => Ok(None),
        }
    }

    async fn find_with_owner(&self, id: Uuid) -> Result<Option<(Reservation, Uuid)>> {
        let Some(reservation) = self.find_by_id(id).await? else {
            return Ok(None);
        };

        let owner_id: String =
            sqlx::query_scalar("SELECT owner_id FROM instruments WHERE id = ?")
                .bind(reservation.instrument_id.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

        let owner_id =
            Uuid::parse_str(&owner_id).map_err(|e| AppError::Database(e.to_string()))?;

        Ok(Some((reservation, owner_id)))
    }

    async fn has_conflict(
        &self,
        instrument_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        exclude: Option<Uuid>,
    ) -> Result<bool> {
        let exclude = exclude.map(|id| id.to_string());

        let count: i64 = sqlx::query_scalar(CONFLICT_COUNT_SQL)
            .bind(instrument_id.to_string())
            .bind(&exclude)
            .bind(&exclude)
            .bind(Utc::now().naive_utc())
            .bind(end)
            .bind(start)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(count > 0)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let now_naive = now.naive_utc();

        let result = sqlx::query(
            r#"
            UPDATE reservations
            SET status = 'Canceled',
                canceled_at = ?,
                cancellation_reason = 'Reservation expired',
                expires_at = NULL,
                updated_at = ?
            WHERE status = 'Pending' AND expires_at <= ?
            "#,
        )
        .bind(now_naive)
        .bind(now_naive)
        .bind(now_naive)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn link_session(
        &self,
        reservation_id: Uuid,
        payment_id: Uuid,
        session_id: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now_naive = Utc::now().naive_utc();

        sqlx::query("UPDATE reservations SET external_session_id = ?, updated_at = ? WHERE id = ?")
            .bind(session_id)
            .bind(now_naive)
            .bind(reservation_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        sqlx::query("UPDATE payments SET external_session_id = ?, updated_at = ? WHERE id = ?")
            .bind(session_id)
            .bind(now_naive)
            .bind(payment_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tx.commit().await.map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn complete_checkout(
        &self,
        reservation_id: Uuid,
        payment_id: Uuid,
        session_id: &str,
    ) -> Result<CheckoutCompletion> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let now_naive = now.naive_utc();

        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM reservations WHERE id = ?",
            RESERVATION_COLUMNS
        ))
        .bind(reservation_id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let Some(row) = row else {
            // Already swept and purged; nothing left to transition.
            return Ok(CheckoutCompletion::ReservationGone);
        };

        match row.status.as_str() {
            "Pending" => {
                // A hold past its expiry is as good as canceled even before
                // the sweeper runs: conflict detection already ignores it, so
                // a newer overlapping hold may legitimately exist. Activating
                // it here could double-book those dates. Fail instead; the
                // processor retries and the sweeper resolves the row first.
                if row.expires_at.is_some_and(|exp| exp <= now_naive) {
                    return Err(AppError::Internal(format!(
                        "reservation {} expired before checkout session {} completed",
                        reservation_id, session_id
                    )));
                }

                sqlx::query(
                    r#"
                    UPDATE payments
                    SET status = 'Succeeded',
                        external_session_id = ?,
                        paid_at = ?,
                        updated_at = ?
                    WHERE id = ? AND status != 'Succeeded'
                    "#,
                )
                .bind(session_id)
                .bind(now_naive)
                .bind(now_naive)
                .bind(payment_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

                sqlx::query(
                    r#"
                    UPDATE reservations
                    SET status = 'Active',
                        external_session_id = ?,
                        expires_at = NULL,
                        updated_at = ?
                    WHERE id = ? AND status = 'Pending'
                    "#,
                )
                .bind(session_id)
                .bind(now_naive)
                .bind(reservation_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

                tx.commit().await.map_err(|e| AppError::Database(e.to_string()))?;

                let reservation = self.find_by_id(reservation_id).await?.ok_or_else(|| {
                    AppError::Database("Failed to retrieve activated reservation".to_string())
                })?;

                Ok(CheckoutCompletion::Activated(reservation))
            }
            "Active" if row.external_session_id.as_deref() == Some(session_id) => {
                Ok(CheckoutCompletion::DuplicateDelivery)
            }
            other => {
                // A completed session for a reservation in any other state
                // means our records and the processor's disagree. Never
                // overwrite; fail so the processor retries and someone can
                // look at it.
                Err(AppError::Internal(format!(
                    "reservation {} is {} while completing checkout session {}",
                    reservation_id, other, session_id
                )))
            }
        }
    }

    async fn expire_checkout(&self, reservation_id: Uuid, payment_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now_naive = Utc::now().naive_utc();

        // Pending-only preconditions: a session-expired event that races a
        // completion (or arrives after one) must not undo it.
        sqlx::query(
            r#"
            UPDATE reservations
            SET status = 'Canceled',
                canceled_at = ?,
                cancellation_reason = 'Payment session expired',
                expires_at = NULL,
                updated_at = ?
            WHERE id = ? AND status = 'Pending'
            "#,
        )
        .bind(now_naive)
        .bind(now_naive)
        .bind(reservation_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        sqlx::query(
            "UPDATE payments SET status = 'Canceled', updated_at = ? WHERE id = ? AND status = 'Pending'",
        )
        .bind(now_naive)
        .bind(payment_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        tx.commit().await.map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn cancel(&self, id: Uuid, canceled_by: Uuid, reason: &str) -> Result<Reservation> {
        let mut tx = self.pool.begin().await?;
        let now_naive = Utc::now().naive_utc();
        let id_str = id.to_string();

        let session_id: Option<Option<String>> =
            sqlx::query_scalar("SELECT external_session_id FROM reservations WHERE id = ?")
                .bind(&id_str)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

        let Some(session_id) = session_id else {
            return Err(AppError::NotFound("Reservation not found".to_string()));
        };

        let result = sqlx::query(
            r#"
            UPDATE reservations
            SET status = 'Canceled',
                canceled_at = ?,
                canceled_by = ?,
                cancellation_reason = ?,
                expires_at = NULL,
                updated_at = ?
            WHERE id = ? AND status IN ('Pending', 'Active')
            "#,
        )
        .bind(now_naive)
        .bind(canceled_by.to_string())
        .bind(reason)
        .bind(now_naive)
        .bind(&id_str)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::InvalidState(
                "Reservation is already finalized and cannot be canceled".to_string(),
            ));
        }

        if let Some(session_id) = session_id.filter(|s| !s.is_empty()) {
            sqlx::query(
                "UPDATE payments SET status = 'Canceled', updated_at = ? WHERE external_session_id = ?",
            )
            .bind(now_naive)
            .bind(&session_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        }

        tx.commit().await.map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve canceled reservation".to_string())
        })
    }
}
