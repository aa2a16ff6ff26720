use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::StkPushGateway;
use crate::payments::types::{
    AccessTokenResponse, MpesaCredentials, StkPushRequest, StkPushResponse,
    TRANSACTION_TYPE_PAYBILL,
};
use crate::payments::utils::{stk_password, HttpAuth, PaymentHttpClient};
use async_trait::async_trait;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

pub const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";
pub const PRODUCTION_BASE_URL: &str = "https://api.safaricom.co.ke";

/// Daraja caps AccountReference at 12 characters.
pub const ACCOUNT_REFERENCE_MAX_LEN: usize = 12;
/// Daraja caps TransactionDesc at 13 characters.
pub const TRANSACTION_DESC_MAX_LEN: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpesaEnvironment {
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => SANDBOX_BASE_URL,
            MpesaEnvironment::Production => PRODUCTION_BASE_URL,
        }
    }
}

impl FromStr for MpesaEnvironment {
    type Err = std::convert::Infallible;

    /// Anything other than `production` falls back to the sandbox.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.trim().to_lowercase().as_str() {
            "production" | "live" => MpesaEnvironment::Production,
            _ => MpesaEnvironment::Sandbox,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MpesaProviderConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for MpesaProviderConfig {
    fn default() -> Self {
        Self {
            base_url: SANDBOX_BASE_URL.to_string(),
            timeout_secs: 30,
            max_retries: 0,
        }
    }
}

pub struct MpesaProvider {
    config: MpesaProviderConfig,
    http: PaymentHttpClient,
}

impl MpesaProvider {
    pub fn new(config: MpesaProviderConfig) -> PaymentResult<Self> {
        let http =
            PaymentHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl StkPushGateway for MpesaProvider {
    async fn access_token(&self, credentials: &MpesaCredentials) -> PaymentResult<String> {
        let raw: AccessTokenResponse = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint("/oauth/v1/generate?grant_type=client_credentials"),
                HttpAuth::Basic {
                    username: &credentials.consumer_key,
                    password: &credentials.consumer_secret,
                },
                None::<&()>,
            )
            .await
            .map_err(|e| {
                warn!(error = %e, "mpesa access token exchange failed");
                e
            })?;

        if raw.access_token.trim().is_empty() {
            return Err(PaymentError::provider(
                "token endpoint returned an empty access_token",
                None,
            ));
        }
        Ok(raw.access_token)
    }

    async fn stk_push(
        &self,
        access_token: &str,
        request: &StkPushRequest,
    ) -> PaymentResult<StkPushResponse> {
        let response: StkPushResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/mpesa/stkpush/v1/processrequest"),
                HttpAuth::Bearer(access_token),
                Some(request),
            )
            .await?;

        info!(
            checkout_request_id = response.checkout_request_id.as_deref().unwrap_or("-"),
            response_code = response.response_code.as_deref().unwrap_or("-"),
            "mpesa stk push submitted"
        );
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "mpesa"
    }
}

/// Inputs for one STK push, already validated.
pub struct StkPushParams<'a> {
    pub short_code: &'a str,
    pub passkey: &'a str,
    pub callback_url: &'a str,
    pub phone_number: &'a str,
    /// Whole shillings.
    pub amount: &'a str,
    pub payment_request_id: &'a str,
    pub description: &'a str,
}

pub fn build_stk_push_request(params: &StkPushParams<'_>, timestamp: &str) -> StkPushRequest {
    StkPushRequest {
        business_short_code: params.short_code.to_string(),
        password: stk_password(params.short_code, params.passkey, timestamp),
        timestamp: timestamp.to_string(),
        transaction_type: TRANSACTION_TYPE_PAYBILL.to_string(),
        amount: params.amount.to_string(),
        party_a: params.phone_number.to_string(),
        party_b: params.short_code.to_string(),
        phone_number: params.phone_number.to_string(),
        callback_url: params.callback_url.to_string(),
        account_reference: truncate_chars(params.payment_request_id, ACCOUNT_REFERENCE_MAX_LEN),
        transaction_desc: truncate_chars(params.description, TRANSACTION_DESC_MAX_LEN),
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.trim().chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> StkPushParams<'static> {
        StkPushParams {
            short_code: "174379",
            passkey: "bfb279f9aa9bdbcf",
            callback_url: "https://club.example/api/payments/mpesa/callback",
            phone_number: "254712345678",
            amount: "200",
            payment_request_id: "pr_abc123def456",
            description: "membership fee",
        }
    }

    #[test]
    fn environment_selects_base_url() {
        assert_eq!(
            "production".parse::<MpesaEnvironment>().unwrap().base_url(),
            PRODUCTION_BASE_URL
        );
        assert_eq!(
            "sandbox".parse::<MpesaEnvironment>().unwrap().base_url(),
            SANDBOX_BASE_URL
        );
        assert_eq!(
            "anything".parse::<MpesaEnvironment>().unwrap(),
            MpesaEnvironment::Sandbox
        );
    }

    #[test]
    fn short_code_is_both_business_and_party_b() {
        let request = build_stk_push_request(&params(), "20261018090507");
        assert_eq!(request.business_short_code, "174379");
        assert_eq!(request.party_b, "174379");
        assert_eq!(request.party_a, "254712345678");
        assert_eq!(request.phone_number, "254712345678");
        assert_eq!(request.timestamp, "20261018090507");
        assert_eq!(
            request.password,
            stk_password("174379", "bfb279f9aa9bdbcf", "20261018090507")
        );
    }

    #[test]
    fn account_reference_and_description_are_truncated() {
        let request = build_stk_push_request(&params(), "20261018090507");
        assert_eq!(request.account_reference, "pr_abc123def");
        assert_eq!(request.transaction_desc, "membership fe");
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let provider = MpesaProvider::new(MpesaProviderConfig {
            base_url: "http://localhost:9000/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            provider.endpoint("/mpesa/stkpush/v1/processrequest"),
            "http://localhost:9000/mpesa/stkpush/v1/processrequest"
        );
    }
}
