//! Persistence seam for the payment flow.
//!
//! Handlers receive an `Arc<dyn PaymentStore>` instead of a global client, so
//! tests can swap in an in-memory fake.

use crate::database::error::DatabaseError;
use crate::database::notification_repository::NotificationRepository;
use crate::database::payment_record_repository::{NewPaymentRecord, PaymentRecordRepository};
use crate::database::payment_request_repository::{PaymentRequest, PaymentRequestRepository};
use crate::database::provider_config_repository::{ProviderConfig, ProviderConfigRepository};
use crate::payments::types::PaymentStatus;
use crate::services::notification::NewNotification;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{info, warn};

/// Everything the success path writes, applied atomically.
#[derive(Debug, Clone)]
pub struct PaymentCompletion {
    pub payment_request_id: String,
    pub record: NewPaymentRecord,
    pub notification: NewNotification,
}

/// Everything the failure path writes, applied atomically.
#[derive(Debug, Clone)]
pub struct PaymentFailure {
    pub payment_request_id: String,
    pub result_code: i32,
    pub result_desc: String,
    pub notification: NewNotification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// The request had already left `pending`; nothing was written.
    AlreadyTerminal,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn active_provider_config(&self) -> Result<Option<ProviderConfig>, DatabaseError>;

    async fn find_payment_request(&self, id: &str)
        -> Result<Option<PaymentRequest>, DatabaseError>;

    async fn find_by_checkout_request_id(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<PaymentRequest>, DatabaseError>;

    async fn record_push_outcome(
        &self,
        payment_request_id: &str,
        checkout_request_id: Option<&str>,
        merchant_request_id: Option<&str>,
        status: PaymentStatus,
    ) -> Result<(), DatabaseError>;

    async fn complete_payment(
        &self,
        completion: &PaymentCompletion,
    ) -> Result<TransitionOutcome, DatabaseError>;

    async fn fail_payment(&self, failure: &PaymentFailure)
        -> Result<TransitionOutcome, DatabaseError>;
}

/// Postgres-backed store.
pub struct PgPaymentStore {
    pool: PgPool,
    configs: ProviderConfigRepository,
    requests: PaymentRequestRepository,
    records: PaymentRecordRepository,
    notifications: NotificationRepository,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            configs: ProviderConfigRepository::new(pool.clone()),
            requests: PaymentRequestRepository::new(pool.clone()),
            records: PaymentRecordRepository::new(pool.clone()),
            notifications: NotificationRepository::new(),
            pool,
        }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn active_provider_config(&self) -> Result<Option<ProviderConfig>, DatabaseError> {
        self.configs.find_active().await
    }

    async fn find_payment_request(
        &self,
        id: &str,
    ) -> Result<Option<PaymentRequest>, DatabaseError> {
        self.requests.find_by_id(id).await
    }

    async fn find_by_checkout_request_id(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<PaymentRequest>, DatabaseError> {
        self.requests
            .find_by_checkout_request_id(checkout_request_id)
            .await
    }

    async fn record_push_outcome(
        &self,
        payment_request_id: &str,
        checkout_request_id: Option<&str>,
        merchant_request_id: Option<&str>,
        status: PaymentStatus,
    ) -> Result<(), DatabaseError> {
        self.requests
            .record_push_outcome(
                payment_request_id,
                checkout_request_id,
                merchant_request_id,
                status,
            )
            .await
    }

    async fn complete_payment(
        &self,
        completion: &PaymentCompletion,
    ) -> Result<TransitionOutcome, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let transitioned = self
            .requests
            .mark_completed_if_pending(&mut tx, &completion.payment_request_id)
            .await?;
        if !transitioned {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            warn!(
                payment_request_id = %completion.payment_request_id,
                "payment request already terminal, skipping completion"
            );
            return Ok(TransitionOutcome::AlreadyTerminal);
        }

        let record = self.records.insert(&mut tx, &completion.record).await?;
        self.notifications
            .insert(&mut tx, &completion.notification)
            .await?;
        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        info!(
            payment_request_id = %completion.payment_request_id,
            payment_id = %record.id,
            receipt = %record.mpesa_receipt_number,
            "payment completed"
        );
        Ok(TransitionOutcome::Applied)
    }

    async fn fail_payment(
        &self,
        failure: &PaymentFailure,
    ) -> Result<TransitionOutcome, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let transitioned = self
            .requests
            .mark_failed_if_pending(
                &mut tx,
                &failure.payment_request_id,
                failure.result_code,
                &failure.result_desc,
            )
            .await?;
        if !transitioned {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            warn!(
                payment_request_id = %failure.payment_request_id,
                "payment request already terminal, skipping failure"
            );
            return Ok(TransitionOutcome::AlreadyTerminal);
        }

        self.notifications
            .insert(&mut tx, &failure.notification)
            .await?;
        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        info!(
            payment_request_id = %failure.payment_request_id,
            result_code = failure.result_code,
            "payment marked failed"
        );
        Ok(TransitionOutcome::Applied)
    }
}
