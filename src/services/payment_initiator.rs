//! STK push initiation
//!
//! Validates a member's payment intent, loads the active Daraja credentials,
//! sends the push and stamps the provider's identifiers onto the payment
//! request. The outcome itself arrives later through the callback.

use crate::database::provider_config_repository::ProviderConfig;
use crate::database::store::PaymentStore;
use crate::error::{AppError, AppResult, DomainError, ValidationError};
use crate::logging::mask_phone_number;
use crate::payments::provider::StkPushGateway;
use crate::payments::providers::mpesa::{build_stk_push_request, StkPushParams};
use crate::payments::types::PaymentStatus;
use crate::payments::utils::stk_timestamp_now;
use bigdecimal::{BigDecimal, RoundingMode};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tracing::{error, info, warn};

/// Minimum length of a payment request id after trimming
pub const MIN_PAYMENT_REQUEST_ID_LEN: usize = 8;

// Kenyan MSISDN in international form
static PHONE_NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^254\d{9}$").expect("Invalid phone number regex"));

/// Body of `POST /api/payments/stk-push`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    #[serde(default)]
    pub amount: Option<BigDecimal>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub payment_request_id: Option<String>,
}

/// Input that passed validation. `amount` is in whole shillings.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPayment {
    pub amount: BigDecimal,
    pub phone_number: String,
    pub payment_request_id: String,
}

impl InitiatePaymentRequest {
    pub fn validate(&self) -> Result<ValidatedPayment, ValidationError> {
        let amount = self.amount.as_ref().ok_or(ValidationError::MissingField {
            field: "amount".to_string(),
        })?;
        let phone_number = self
            .phone_number
            .as_deref()
            .ok_or(ValidationError::MissingField {
                field: "phoneNumber".to_string(),
            })?
            .trim();
        let payment_request_id = self
            .payment_request_id
            .as_deref()
            .ok_or(ValidationError::MissingField {
                field: "paymentRequestId".to_string(),
            })?
            .trim();

        let zero = BigDecimal::from(0);
        if *amount <= zero {
            return Err(ValidationError::InvalidAmount {
                amount: amount.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        // Daraja only takes whole shillings
        let whole_shillings = amount.with_scale_round(0, RoundingMode::HalfUp);
        if whole_shillings <= zero {
            return Err(ValidationError::InvalidAmount {
                amount: amount.to_string(),
                reason: "must be at least 1 KES".to_string(),
            });
        }

        if !PHONE_NUMBER_REGEX.is_match(phone_number) {
            return Err(ValidationError::InvalidPhoneNumber {
                phone_number: mask_phone_number(phone_number),
            });
        }

        if payment_request_id.chars().count() < MIN_PAYMENT_REQUEST_ID_LEN {
            return Err(ValidationError::InvalidField {
                field: "paymentRequestId".to_string(),
                reason: format!(
                    "must be at least {} characters",
                    MIN_PAYMENT_REQUEST_ID_LEN
                ),
            });
        }

        Ok(ValidatedPayment {
            amount: whole_shillings,
            phone_number: phone_number.to_string(),
            payment_request_id: payment_request_id.to_string(),
        })
    }
}

/// What the client sees after a push attempt the provider answered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiationOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_request_id: Option<String>,
}

pub struct PaymentInitiator {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn StkPushGateway>,
}

impl PaymentInitiator {
    pub fn new(store: Arc<dyn PaymentStore>, gateway: Arc<dyn StkPushGateway>) -> Self {
        Self { store, gateway }
    }

    pub async fn initiate(&self, input: &InitiatePaymentRequest) -> AppResult<InitiationOutcome> {
        let payment = input.validate().map_err(AppError::validation)?;

        let config = self.load_provider_config().await?;

        let request = self
            .store
            .find_payment_request(&payment.payment_request_id)
            .await?
            .ok_or_else(|| {
                AppError::domain(DomainError::PaymentRequestNotFound {
                    payment_request_id: payment.payment_request_id.clone(),
                })
            })?;
        if request.status == PaymentStatus::Completed {
            warn!(
                payment_request_id = %request.id,
                "refusing to push for an already completed payment request"
            );
            return Err(AppError::domain(DomainError::PaymentAlreadyCompleted {
                payment_request_id: request.id,
            }));
        }

        info!(
            payment_request_id = %request.id,
            phone = %mask_phone_number(&payment.phone_number),
            amount = %payment.amount,
            provider = self.gateway.name(),
            "initiating stk push"
        );

        let access_token = self
            .gateway
            .access_token(&config.credentials())
            .await
            .map_err(|e| {
                error!(payment_request_id = %request.id, error = %e, "access token request failed");
                AppError::from(e).with_context("access token")
            })?;

        let amount = payment.amount.to_string();
        let description = transaction_description(&request.payment_type);
        let push = build_stk_push_request(
            &StkPushParams {
                short_code: &config.short_code,
                passkey: &config.passkey,
                callback_url: &config.callback_url,
                phone_number: &payment.phone_number,
                amount: &amount,
                payment_request_id: &request.id,
                description: &description,
            },
            &stk_timestamp_now(),
        );

        let response = self
            .gateway
            .stk_push(&access_token, &push)
            .await
            .map_err(|e| {
                error!(payment_request_id = %request.id, error = %e, "stk push request failed");
                AppError::from(e).with_context("stk push")
            })?;

        let accepted = response.is_accepted();
        let status = if accepted {
            PaymentStatus::Pending
        } else {
            PaymentStatus::Failed
        };
        self.store
            .record_push_outcome(
                &request.id,
                response.checkout_request_id.as_deref(),
                response.merchant_request_id.as_deref(),
                status,
            )
            .await?;

        if accepted {
            info!(
                payment_request_id = %request.id,
                checkout_request_id = response.checkout_request_id.as_deref().unwrap_or("-"),
                "stk push accepted"
            );
        } else {
            warn!(
                payment_request_id = %request.id,
                response_code = response.response_code.as_deref().unwrap_or("-"),
                "stk push rejected by provider"
            );
        }

        Ok(InitiationOutcome {
            success: accepted,
            message: response.message(),
            checkout_request_id: response.checkout_request_id,
        })
    }

    async fn load_provider_config(&self) -> AppResult<ProviderConfig> {
        match self.store.active_provider_config().await? {
            Some(config) => Ok(config),
            None => {
                error!("no active mpesa_config row");
                Err(AppError::domain(DomainError::ProviderConfigNotFound))
            }
        }
    }
}

fn transaction_description(payment_type: &str) -> String {
    let payment_type = payment_type.trim();
    if payment_type.is_empty() {
        "Club payment".to_string()
    } else {
        payment_type.replace('_', " ")
    }
}
