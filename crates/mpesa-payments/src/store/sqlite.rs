//! SQLite Payment Store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;

use super::PaymentStore;
use crate::error::{PaymentError, Result};
use crate::model::{
    FinalizeOutcome, FinalizeRequest, PaymentId, PaymentRecord, PaymentStatus, PaymentSummary,
};
use crate::phone::PhoneNumber;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

const SELECT_COLUMNS: &str = "SELECT id, amount, phone_number, status, checkout_request_id, \
     transaction_id, created_at, updated_at, failure_reason FROM payments";

/// Payment store backed by a SQLite database
#[derive(Clone, Debug)]
pub struct SqlitePaymentStore {
    pool: SqlitePool,
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    id: String,
    amount: String,
    phone_number: String,
    status: String,
    checkout_request_id: Option<String>,
    transaction_id: Option<String>,
    created_at: i64,
    updated_at: Option<i64>,
    failure_reason: Option<String>,
}

impl TryFrom<PaymentRow> for PaymentRecord {
    type Error = PaymentError;

    fn try_from(row: PaymentRow) -> Result<Self> {
        let corrupt = |field: &str| PaymentError::Storage(format!("corrupt {field} in payment {}", row.id));

        Ok(Self {
            id: PaymentId::parse(&row.id).ok_or_else(|| corrupt("id"))?,
            amount: Decimal::from_str(&row.amount).map_err(|_| corrupt("amount"))?,
            phone_number: PhoneNumber::parse(&row.phone_number).map_err(|_| corrupt("phone_number"))?,
            status: PaymentStatus::parse(&row.status).ok_or_else(|| corrupt("status"))?,
            created_at: from_millis(row.created_at).ok_or_else(|| corrupt("created_at"))?,
            updated_at: row.updated_at.and_then(from_millis),
            checkout_request_id: row.checkout_request_id,
            transaction_id: row.transaction_id,
            failure_reason: row.failure_reason,
        })
    }
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

fn to_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl SqlitePaymentStore {
    /// Connect to `url` (e.g. `sqlite://payments.db`), creating the file if needed
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database, lives as long as the store
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // Every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA_SQL.split(';') {
            let sql = statement.trim();
            if sql.is_empty() {
                continue;
            }
            sqlx::query(sql).execute(&self.pool).await?;
        }
        tracing::debug!("payments schema ready");
        Ok(())
    }

    async fn fetch(&self, sql: &str, limit: usize, binds: &[&str]) -> Result<Vec<PaymentRecord>> {
        let mut query = sqlx::query_as::<_, PaymentRow>(sql);
        for bind in binds {
            query = query.bind(*bind);
        }

        query
            .bind(to_limit(limit))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(PaymentRecord::try_from)
            .collect()
    }
}

#[async_trait]
impl PaymentStore for SqlitePaymentStore {
    async fn create(&self, amount: Decimal, phone_number: &PhoneNumber) -> Result<PaymentRecord> {
        let record = PaymentRecord::new(amount, phone_number.clone());

        sqlx::query(
            "INSERT INTO payments(id, amount, phone_number, status, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(record.amount.to_string())
        .bind(record.phone_number.as_str())
        .bind(record.status.as_str())
        .bind(record.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn attach_checkout_request_id(
        &self,
        id: &PaymentId,
        checkout_request_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE payments SET checkout_request_id = ? WHERE id = ?")
            .bind(checkout_request_id)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn finalize(&self, request: &FinalizeRequest) -> Result<FinalizeOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "{SELECT_COLUMNS} WHERE checkout_request_id = ?"
        ))
        .bind(&request.checkout_request_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(FinalizeOutcome::Unmatched);
        };

        let mut record = PaymentRecord::try_from(row)?;
        if record.status.is_terminal() {
            tx.commit().await?;
            return Ok(FinalizeOutcome::AlreadyFinal(record));
        }

        record.apply(request);

        let result = sqlx::query(
            "UPDATE payments SET status = ?, updated_at = ?, transaction_id = ?, failure_reason = ?, \
             phone_number = ?, amount = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(record.status.as_str())
        .bind(record.updated_at.map(|t| t.timestamp_millis()))
        .bind(record.transaction_id.as_deref())
        .bind(record.failure_reason.as_deref())
        .bind(record.phone_number.as_str())
        .bind(record.amount.to_string())
        .bind(record.id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if result.rows_affected() == 0 {
            // Another writer finalized it between our read and update
            return match self.get_by_id(&record.id).await? {
                Some(current) => Ok(FinalizeOutcome::AlreadyFinal(current)),
                None => Ok(FinalizeOutcome::Unmatched),
            };
        }

        Ok(FinalizeOutcome::Applied(record))
    }

    async fn get_by_id(&self, id: &PaymentId) -> Result<Option<PaymentRecord>> {
        sqlx::query_as::<_, PaymentRow>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(PaymentRecord::try_from)
            .transpose()
    }

    async fn get_by_phone(
        &self,
        phone_number: &PhoneNumber,
        limit: usize,
    ) -> Result<Vec<PaymentRecord>> {
        self.fetch(
            &format!("{SELECT_COLUMNS} WHERE phone_number = ? ORDER BY created_at DESC, rowid DESC LIMIT ?"),
            limit,
            &[phone_number.as_str()],
        )
        .await
    }

    async fn get_all(
        &self,
        limit: usize,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<PaymentRecord>> {
        match status {
            Some(status) => {
                self.fetch(
                    &format!("{SELECT_COLUMNS} WHERE status = ? ORDER BY created_at DESC, rowid DESC LIMIT ?"),
                    limit,
                    &[status.as_str()],
                )
                .await
            }
            None => {
                self.fetch(
                    &format!("{SELECT_COLUMNS} ORDER BY created_at DESC, rowid DESC LIMIT ?"),
                    limit,
                    &[],
                )
                .await
            }
        }
    }

    async fn summary(&self) -> Result<PaymentSummary> {
        let rows = sqlx::query_as::<_, (String, String)>("SELECT status, amount FROM payments")
            .fetch_all(&self.pool)
            .await?;

        let mut summary = PaymentSummary::default();
        for (status, amount) in rows {
            let status = PaymentStatus::parse(&status)
                .ok_or_else(|| PaymentError::Storage(format!("corrupt status {status}")))?;
            let amount = Decimal::from_str(&amount)
                .map_err(|_| PaymentError::Storage(format!("corrupt amount {amount}")))?;
            summary.record(status, amount);
        }
        Ok(summary)
    }
}
