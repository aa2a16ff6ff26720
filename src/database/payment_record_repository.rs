use crate::database::error::DatabaseError;
use crate::payments::types::PaymentStatus;
use sqlx::{types::BigDecimal, FromRow, PgPool, Postgres, Transaction};

/// A settled payment, written once by the callback success path.
#[derive(Debug, Clone, FromRow)]
pub struct PaymentRecord {
    pub id: String,
    pub user_id: String,
    pub mpesa_receipt_number: String,
    pub phone_number: String,
    pub amount: BigDecimal,
    pub payment_type: String,
    pub reference_id: Option<String>,
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
    pub status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPaymentRecord {
    pub user_id: String,
    pub mpesa_receipt_number: String,
    pub phone_number: String,
    pub amount: BigDecimal,
    pub payment_type: String,
    pub reference_id: Option<String>,
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
    pub status: PaymentStatus,
}

pub struct PaymentRecordRepository {
    pool: PgPool,
}

impl PaymentRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        record: &NewPaymentRecord,
    ) -> Result<PaymentRecord, DatabaseError> {
        sqlx::query_as::<_, PaymentRecord>(
            "INSERT INTO payments
             (user_id, mpesa_receipt_number, phone_number, amount, payment_type, reference_id,
              checkout_request_id, merchant_request_id, status)
             VALUES ($1::uuid, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING id::text AS id, user_id::text AS user_id, mpesa_receipt_number,
                       phone_number, amount, payment_type, reference_id, checkout_request_id,
                       merchant_request_id, status, created_at",
        )
        .bind(&record.user_id)
        .bind(&record.mpesa_receipt_number)
        .bind(&record.phone_number)
        .bind(&record.amount)
        .bind(&record.payment_type)
        .bind(&record.reference_id)
        .bind(&record.checkout_request_id)
        .bind(&record.merchant_request_id)
        .bind(record.status.as_str())
        .fetch_one(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_checkout_request_id(
        &self,
        checkout_request_id: &str,
    ) -> Result<Vec<PaymentRecord>, DatabaseError> {
        sqlx::query_as::<_, PaymentRecord>(
            "SELECT id::text AS id, user_id::text AS user_id, mpesa_receipt_number, phone_number,
                    amount, payment_type, reference_id, checkout_request_id, merchant_request_id,
                    status, created_at
             FROM payments
             WHERE checkout_request_id = $1
             ORDER BY created_at ASC",
        )
        .bind(checkout_request_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
