use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::Instrument,
    error::{AppError, Result},
    repository::InstrumentRepository,
};

#[derive(FromRow)]
struct InstrumentRow {
    id: String,
    owner_id: String,
    title: String,
    daily_rate_cents: i64,
    default_address: String,
    created_at: NaiveDateTime,
}

pub struct SqliteInstrumentRepository {
    pool: SqlitePool,
}

impl SqliteInstrumentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_instrument(row: InstrumentRow) -> Result<Instrument> {
        Ok(Instrument {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            owner_id: Uuid::parse_str(&row.owner_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            title: row.title,
            daily_rate_cents: row.daily_rate_cents,
            default_address: row.default_address,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
        })
    }
}

#[async_trait]
impl InstrumentRepository for SqliteInstrumentRepository {
    async fn create(&self, instrument: Instrument) -> Result<Instrument> {
        sqlx::query(
            r#"
            INSERT INTO instruments (id, owner_id, title, daily_rate_cents, default_address, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(instrument.id.to_string())
        .bind(instrument.owner_id.to_string())
        .bind(&instrument.title)
        .bind(instrument.daily_rate_cents)
        .bind(&instrument.default_address)
        .bind(instrument.created_at.naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(instrument.id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created instrument".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Instrument>> {
        let row = sqlx::query_as::<_, InstrumentRow>(
            r#"
            SELECT id, owner_id, title, daily_rate_cents, default_address, created_at
            FROM instruments
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_instrument(r)?)),
            None => Ok(None),
        }
    }
}
