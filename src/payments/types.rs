use crate::payments::error::PaymentError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

/// Result code M-Pesa uses for a successful STK transaction.
pub const RESULT_CODE_SUCCESS: i64 = 0;

/// Response code returned when the provider accepted the push for delivery.
pub const RESPONSE_CODE_ACCEPTED: &str = "0";

pub const TRANSACTION_TYPE_PAYBILL: &str = "CustomerPayBillOnline";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            _ => Err(PaymentError::ValidationError {
                message: format!("unknown payment status: {}", value),
                field: Some("status".to_string()),
            }),
        }
    }
}

/// Consumer credentials exchanged for a bearer token.
#[derive(Clone)]
pub struct MpesaCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushRequest {
    pub business_short_code: String,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: String,
    pub amount: String,
    pub party_a: String,
    pub party_b: String,
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: Option<String>,
    #[serde(rename = "ResponseCode", default)]
    pub response_code: Option<String>,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: Option<String>,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: Option<String>,
}

impl StkPushResponse {
    pub fn is_accepted(&self) -> bool {
        self.response_code.as_deref().map(str::trim) == Some(RESPONSE_CODE_ACCEPTED)
    }

    /// Customer-facing text, falling back to the technical description.
    pub fn message(&self) -> String {
        self.customer_message
            .clone()
            .or_else(|| self.response_description.clone())
            .unwrap_or_else(|| {
                if self.is_accepted() {
                    "Payment request sent to your phone".to_string()
                } else {
                    "Payment request was rejected".to_string()
                }
            })
    }
}

/// Top-level body the provider POSTs to the callback URL.
#[derive(Debug, Clone, Deserialize)]
pub struct StkCallbackEnvelope {
    #[serde(rename = "Body", default)]
    pub body: Option<StkCallbackBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StkCallbackBody {
    #[serde(rename = "stkCallback", default)]
    pub stk_callback: Option<StkCallback>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode", deserialize_with = "deserialize_result_code")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

impl StkCallback {
    pub fn is_success(&self) -> bool {
        self.result_code == RESULT_CODE_SUCCESS
    }

    pub fn metadata_value(&self, name: &str) -> Option<&JsonValue> {
        self.callback_metadata
            .as_ref()
            .and_then(|metadata| metadata.value(name))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<CallbackItem>,
}

impl CallbackMetadata {
    /// Value of the named item; items without a value count as absent.
    pub fn value(&self, name: &str) -> Option<&JsonValue> {
        self.items
            .iter()
            .find(|item| item.name == name)
            .and_then(|item| item.value.as_ref())
            .filter(|value| !value.is_null())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<JsonValue>,
}

// Daraja sends ResultCode as a number, some gateways relay it as a string.
fn deserialize_result_code<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match JsonValue::deserialize(deserializer)? {
        JsonValue::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom("ResultCode must be an integer")),
        JsonValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom("ResultCode must be an integer")),
        _ => Err(serde::de::Error::custom("ResultCode must be an integer")),
    }
}
