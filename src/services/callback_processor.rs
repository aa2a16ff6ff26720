//! M-Pesa STK callback handling
//!
//! Daraja POSTs the final result of every push to the callback URL. A
//! successful result settles the payment request, stores the payment record
//! and notifies the member; any other result code marks the request failed.

use serde_json::Value as JsonValue;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::database::error::DatabaseError;
use crate::database::payment_record_repository::NewPaymentRecord;
use crate::database::payment_request_repository::PaymentRequest;
use crate::database::store::{PaymentCompletion, PaymentFailure, PaymentStore, TransitionOutcome};
use crate::logging::mask_phone_number;
use crate::payments::types::{PaymentStatus, StkCallback, StkCallbackEnvelope};
use crate::services::notification::NotificationService;
use bigdecimal::BigDecimal;

pub const ITEM_AMOUNT: &str = "Amount";
pub const ITEM_RECEIPT: &str = "MpesaReceiptNumber";
pub const ITEM_PHONE_NUMBER: &str = "PhoneNumber";

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Invalid callback payload: {0}")]
    InvalidPayload(String),
    #[error("Missing stkCallback in payload")]
    MissingCallback,
    #[error("Payment request not found for checkout {0}")]
    PaymentRequestNotFound(String),
    #[error("Missing callback metadata: {0}")]
    MissingMetadata(&'static str),
    #[error("Invalid callback metadata {field}: {reason}")]
    InvalidMetadata { field: &'static str, reason: String },
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl CallbackError {
    pub fn status_code(&self) -> u16 {
        match self {
            CallbackError::InvalidPayload(_) | CallbackError::MissingCallback => 400,
            CallbackError::PaymentRequestNotFound(_) => 404,
            // A success result we cannot record is a processing failure, not a bad delivery
            CallbackError::MissingMetadata(_)
            | CallbackError::InvalidMetadata { .. }
            | CallbackError::Database(_) => 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    Completed,
    Failed,
    /// The request was already settled; nothing was written.
    AlreadyProcessed,
}

/// Metadata items the success path requires.
#[derive(Debug, Clone, PartialEq)]
struct SuccessMetadata {
    amount: BigDecimal,
    receipt: String,
    phone_number: String,
}

pub struct CallbackProcessor {
    store: Arc<dyn PaymentStore>,
    notifications: NotificationService,
}

impl CallbackProcessor {
    pub fn new(store: Arc<dyn PaymentStore>) -> Self {
        Self {
            store,
            notifications: NotificationService::new(),
        }
    }

    pub async fn process(&self, body: &str) -> Result<CallbackOutcome, CallbackError> {
        let callback = parse_callback(body)?;

        info!(
            checkout_request_id = %callback.checkout_request_id,
            result_code = callback.result_code,
            result_desc = %callback.result_desc,
            "received mpesa callback"
        );

        let request = self
            .store
            .find_by_checkout_request_id(&callback.checkout_request_id)
            .await?
            .ok_or_else(|| {
                warn!(
                    checkout_request_id = %callback.checkout_request_id,
                    "callback for unknown checkout request"
                );
                CallbackError::PaymentRequestNotFound(callback.checkout_request_id.clone())
            })?;

        if callback.is_success() {
            let metadata = extract_success_metadata(&callback)?;
            self.complete(&request, &callback, metadata).await
        } else {
            self.fail(&request, &callback).await
        }
    }

    async fn complete(
        &self,
        request: &PaymentRequest,
        callback: &StkCallback,
        metadata: SuccessMetadata,
    ) -> Result<CallbackOutcome, CallbackError> {
        match request.status {
            PaymentStatus::Completed => {
                warn!(
                    payment_request_id = %request.id,
                    receipt = %metadata.receipt,
                    "duplicate success callback ignored"
                );
                return Ok(CallbackOutcome::AlreadyProcessed);
            }
            PaymentStatus::Failed => {
                // Money moved but the request is closed; needs manual reconciliation
                error!(
                    payment_request_id = %request.id,
                    receipt = %metadata.receipt,
                    amount = %metadata.amount,
                    phone = %mask_phone_number(&metadata.phone_number),
                    "success callback for a failed payment request, receipt not recorded"
                );
                return Ok(CallbackOutcome::AlreadyProcessed);
            }
            PaymentStatus::Pending => {}
        }

        let notification =
            self.notifications
                .payment_completed(request, &metadata.amount, &metadata.receipt);
        let completion = PaymentCompletion {
            payment_request_id: request.id.clone(),
            record: NewPaymentRecord {
                user_id: request.user_id.clone(),
                mpesa_receipt_number: metadata.receipt,
                phone_number: metadata.phone_number,
                amount: metadata.amount,
                payment_type: request.payment_type.clone(),
                reference_id: request.reference_id.clone(),
                checkout_request_id: callback.checkout_request_id.clone(),
                merchant_request_id: callback
                    .merchant_request_id
                    .clone()
                    .or_else(|| request.merchant_request_id.clone()),
                status: PaymentStatus::Completed,
            },
            notification,
        };

        info!(
            payment_request_id = %request.id,
            receipt = %completion.record.mpesa_receipt_number,
            phone = %mask_phone_number(&completion.record.phone_number),
            "settling payment request"
        );

        match self.store.complete_payment(&completion).await {
            Ok(TransitionOutcome::Applied) => Ok(CallbackOutcome::Completed),
            Ok(TransitionOutcome::AlreadyTerminal) => {
                warn!(
                    payment_request_id = %request.id,
                    receipt = %completion.record.mpesa_receipt_number,
                    "payment request settled concurrently, receipt not recorded"
                );
                Ok(CallbackOutcome::AlreadyProcessed)
            }
            Err(e) => {
                error!(payment_request_id = %request.id, error = %e, "failed to settle payment");
                Err(e.into())
            }
        }
    }

    async fn fail(
        &self,
        request: &PaymentRequest,
        callback: &StkCallback,
    ) -> Result<CallbackOutcome, CallbackError> {
        if request.status.is_terminal() {
            warn!(
                payment_request_id = %request.id,
                status = %request.status,
                "duplicate failure callback ignored"
            );
            return Ok(CallbackOutcome::AlreadyProcessed);
        }

        let result_code = i32::try_from(callback.result_code).map_err(|_| {
            CallbackError::InvalidPayload(format!(
                "ResultCode {} out of range",
                callback.result_code
            ))
        })?;
        let failure = PaymentFailure {
            payment_request_id: request.id.clone(),
            result_code,
            result_desc: callback.result_desc.clone(),
            notification: self
                .notifications
                .payment_failed(request, &callback.result_desc),
        };

        match self.store.fail_payment(&failure).await {
            Ok(TransitionOutcome::Applied) => Ok(CallbackOutcome::Failed),
            Ok(TransitionOutcome::AlreadyTerminal) => Ok(CallbackOutcome::AlreadyProcessed),
            Err(e) => {
                error!(payment_request_id = %request.id, error = %e, "failed to record payment failure");
                Err(e.into())
            }
        }
    }
}

fn parse_callback(body: &str) -> Result<StkCallback, CallbackError> {
    if body.trim().is_empty() {
        return Err(CallbackError::InvalidPayload("empty body".to_string()));
    }

    let raw: JsonValue = serde_json::from_str(body)
        .map_err(|e| CallbackError::InvalidPayload(e.to_string()))?;
    let envelope: StkCallbackEnvelope = serde_json::from_value(raw)
        .map_err(|e| CallbackError::InvalidPayload(e.to_string()))?;

    envelope
        .body
        .and_then(|body| body.stk_callback)
        .ok_or(CallbackError::MissingCallback)
}

fn extract_success_metadata(callback: &StkCallback) -> Result<SuccessMetadata, CallbackError> {
    let amount = callback
        .metadata_value(ITEM_AMOUNT)
        .ok_or(CallbackError::MissingMetadata(ITEM_AMOUNT))?;
    let receipt = callback
        .metadata_value(ITEM_RECEIPT)
        .ok_or(CallbackError::MissingMetadata(ITEM_RECEIPT))?;
    let phone_number = callback
        .metadata_value(ITEM_PHONE_NUMBER)
        .ok_or(CallbackError::MissingMetadata(ITEM_PHONE_NUMBER))?;

    Ok(SuccessMetadata {
        amount: decimal_value(ITEM_AMOUNT, amount)?,
        receipt: text_value(ITEM_RECEIPT, receipt)?,
        phone_number: text_value(ITEM_PHONE_NUMBER, phone_number)?,
    })
}

fn decimal_value(field: &'static str, value: &JsonValue) -> Result<BigDecimal, CallbackError> {
    let text = match value {
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.trim().to_string(),
        other => {
            return Err(CallbackError::InvalidMetadata {
                field,
                reason: format!("expected a number, got {}", other),
            })
        }
    };
    BigDecimal::from_str(&text).map_err(|e| CallbackError::InvalidMetadata {
        field,
        reason: e.to_string(),
    })
}

// Receipts are strings; phone numbers usually arrive as bare integers.
fn text_value(field: &'static str, value: &JsonValue) -> Result<String, CallbackError> {
    let text = match value {
        JsonValue::String(s) => s.trim().to_string(),
        JsonValue::Number(n) => n.to_string(),
        other => {
            return Err(CallbackError::InvalidMetadata {
                field,
                reason: format!("expected text, got {}", other),
            })
        }
    };
    if text.is_empty() {
        return Err(CallbackError::MissingMetadata(field));
    }
    Ok(text)
}
