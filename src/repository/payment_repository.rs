use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{NewPayment, Payment, PaymentStatus},
    error::{AppError, Result},
    repository::PaymentRepository,
};

#[derive(FromRow)]
struct PaymentRow {
    id: String,
    user_id: String,
    instrument_id: String,
    amount_cents: i64,
    currency: String,
    status: String,
    external_session_id: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    paid_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqlitePaymentRepository {
    pool: SqlitePool,
}

impl SqlitePaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: PaymentRow) -> Result<Payment> {
        Ok(Payment {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            user_id: Uuid::parse_str(&row.user_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            instrument_id: Uuid::parse_str(&row.instrument_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            amount_cents: row.amount_cents,
            currency: row.currency,
            status: Self::parse_status(&row.status)?,
            external_session_id: row.external_session_id,
            start_date: row.start_date,
            end_date: row.end_date,
            paid_at: row.paid_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    fn parse_status(s: &str) -> Result<PaymentStatus> {
        match s {
            "Pending" => Ok(PaymentStatus::Pending),
            "Succeeded" => Ok(PaymentStatus::Succeeded),
            "Canceled" => Ok(PaymentStatus::Canceled),
            "Failed" => Ok(PaymentStatus::Failed),
            _ => Err(AppError::Database(format!("Invalid payment status: {}", s))),
        }
    }
}

#[async_trait]
impl PaymentRepository for SqlitePaymentRepository {
    async fn create(&self, payment: NewPayment) -> Result<Payment> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        // external_session_id starts as the empty-string placeholder; the
        // reservation repository stamps the real id during link_session.
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, user_id, instrument_id, amount_cents, currency,
                status, external_session_id, start_date, end_date,
                paid_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 'Pending', '', ?, ?, NULL, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(payment.user_id.to_string())
        .bind(payment.instrument_id.to_string())
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(payment.start_date)
        .bind(payment.end_date)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created payment".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, user_id, instrument_id, amount_cents, currency,
                   status, external_session_id, start_date, end_date,
                   paid_at, created_at, updated_at
            FROM payments
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_payment(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_session(&self, session_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, user_id, instrument_id, amount_cents, currency,
                   status, external_session_id, start_date, end_date,
                   paid_at, created_at, updated_at
            FROM payments
            WHERE external_session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_payment(r)?)),
            None => Ok(None),
        }
    }
}
