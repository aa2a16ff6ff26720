use crate::payments::error::PaymentResult;
use crate::payments::types::{MpesaCredentials, StkPushRequest, StkPushResponse};
use async_trait::async_trait;

/// Outbound half of the STK Push flow.
///
/// Credentials are passed per call because they live in the database and
/// may be rotated between requests.
#[async_trait]
pub trait StkPushGateway: Send + Sync {
    async fn access_token(&self, credentials: &MpesaCredentials) -> PaymentResult<String>;

    async fn stk_push(
        &self,
        access_token: &str,
        request: &StkPushRequest,
    ) -> PaymentResult<StkPushResponse>;

    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::error::PaymentError;

    struct MockGateway;

    #[async_trait]
    impl StkPushGateway for MockGateway {
        async fn access_token(&self, credentials: &MpesaCredentials) -> PaymentResult<String> {
            if credentials.consumer_key.is_empty() {
                return Err(PaymentError::provider("missing consumer key", None));
            }
            Ok("mock_token".to_string())
        }

        async fn stk_push(
            &self,
            access_token: &str,
            request: &StkPushRequest,
        ) -> PaymentResult<StkPushResponse> {
            assert_eq!(access_token, "mock_token");
            Ok(StkPushResponse {
                merchant_request_id: Some("mock_merchant".to_string()),
                checkout_request_id: Some(format!("ws_CO_{}", request.account_reference)),
                response_code: Some("0".to_string()),
                response_description: None,
                customer_message: None,
            })
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    #[tokio::test]
    async fn trait_can_be_implemented_by_mock_gateway() {
        let gateway: Box<dyn StkPushGateway> = Box::new(MockGateway);
        let token = gateway
            .access_token(&MpesaCredentials {
                consumer_key: "key".to_string(),
                consumer_secret: "secret".to_string(),
            })
            .await
            .expect("token exchange should succeed");

        let response = gateway
            .stk_push(
                &token,
                &StkPushRequest {
                    business_short_code: "174379".to_string(),
                    password: "pw".to_string(),
                    timestamp: "20261018090507".to_string(),
                    transaction_type: "CustomerPayBillOnline".to_string(),
                    amount: "1".to_string(),
                    party_a: "254712345678".to_string(),
                    party_b: "174379".to_string(),
                    phone_number: "254712345678".to_string(),
                    callback_url: "https://club.example/cb".to_string(),
                    account_reference: "pr_1".to_string(),
                    transaction_desc: "test".to_string(),
                },
            )
            .await
            .expect("push should succeed");
        assert!(response.is_accepted());
        assert_eq!(response.checkout_request_id.as_deref(), Some("ws_CO_pr_1"));
    }
}
