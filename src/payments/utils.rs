use crate::payments::error::{PaymentError, PaymentResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How a provider request authenticates.
pub enum HttpAuth<'a> {
    Basic { username: &'a str, password: &'a str },
    Bearer(&'a str),
}

#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    timeout: Duration,
    max_retries: u32,
}

impl PaymentHttpClient {
    pub fn new(timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::NetworkError {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self {
            client,
            timeout,
            max_retries,
        })
    }

    /// Sends one request and decodes a JSON success body.
    ///
    /// With `max_retries == 0` (the default) every call is a single attempt.
    /// Otherwise transport errors, 429 and 5xx responses are retried with
    /// exponential backoff; any other non-2xx response fails immediately with
    /// the provider's raw body in the error message.
    pub async fn request_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        url: &str,
        auth: HttpAuth<'_>,
        body: Option<&B>,
    ) -> PaymentResult<T> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            let mut request = self.client.request(method.clone(), url);
            request = request.timeout(self.timeout);

            request = match &auth {
                HttpAuth::Basic { username, password } => {
                    request.basic_auth(*username, Some(*password))
                }
                HttpAuth::Bearer(token) => request.bearer_auth(*token),
            };
            if let Some(payload) = body {
                request = request.json(payload);
            }

            let started = Instant::now();
            let response = request
                .send()
                .await
                .map_err(|e| PaymentError::NetworkError {
                    message: format!("provider request failed: {}", e),
                });

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    debug!(
                        url = %url,
                        status = status.as_u16(),
                        duration_ms = started.elapsed().as_millis() as u64,
                        "provider call finished"
                    );
                    if status.is_success() {
                        return serde_json::from_str::<T>(&text).map_err(|e| {
                            PaymentError::provider(
                                format!("invalid provider JSON response: {}", e),
                                None,
                            )
                        });
                    }

                    if status.as_u16() == 429 {
                        if attempt < self.max_retries {
                            tokio::time::sleep(backoff(attempt)).await;
                            continue;
                        }
                        return Err(PaymentError::RateLimitError {
                            message: format!("provider rate limit exceeded: {}", text),
                            retry_after_seconds: None,
                        });
                    }

                    if status.is_server_error() && attempt < self.max_retries {
                        warn!(
                            status = %status,
                            attempt = attempt + 1,
                            "provider server error, retrying"
                        );
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }

                    return Err(PaymentError::ProviderError {
                        provider: "mpesa".to_string(),
                        message: format!("HTTP {}: {}", status, text),
                        provider_code: Some(status.as_u16().to_string()),
                        retryable: status.is_server_error(),
                    });
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(PaymentError::NetworkError {
            message: "provider request failed".to_string(),
        }))
    }
}

const EAT_OFFSET_SECS: i32 = 3 * 3600;

fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.min(5))
}

/// `YYYYMMDDHHMMSS`, the timestamp format the STK endpoints expect.
pub fn stk_timestamp<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format("%Y%m%d%H%M%S").to_string()
}

/// Current time as an STK timestamp in East Africa Time (UTC+3).
pub fn stk_timestamp_now() -> String {
    let now = Utc::now();
    match FixedOffset::east_opt(EAT_OFFSET_SECS) {
        Some(eat) => stk_timestamp(&now.with_timezone(&eat)),
        None => stk_timestamp(&now),
    }
}

/// STK request password: base64 of short code, passkey and timestamp.
pub fn stk_password(short_code: &str, passkey: &str, timestamp: &str) -> String {
    BASE64.encode(format!("{}{}{}", short_code, passkey, timestamp))
}
