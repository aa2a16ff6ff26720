//! Browser-facing payment endpoints
//!
//! `POST /api/payments/stk-push` starts an M-Pesa push for a payment request;
//! `GET /api/payments/requests/{id}` lets the client poll for the outcome.
//! Both answer preflight requests and carry the same CORS and security headers.

use crate::database::payment_request_repository::PaymentRequest;
use crate::database::store::PaymentStore;
use crate::error::{AppError, DomainError, ValidationError};
use crate::middleware::error::{get_request_id_from_headers, log_app_error, status_of, ErrorResponse};
use crate::services::payment_initiator::{InitiatePaymentRequest, PaymentInitiator};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bigdecimal::BigDecimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

const ALLOWED_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

#[derive(Clone)]
pub struct PaymentsState {
    pub initiator: Arc<PaymentInitiator>,
    pub store: Arc<dyn PaymentStore>,
    pub allowed_origin: HeaderValue,
}

pub fn routes(state: PaymentsState) -> Router {
    Router::new()
        .route(
            "/api/payments/stk-push",
            post(initiate_stk_push).options(options_stk_push),
        )
        .route(
            "/api/payments/requests/{id}",
            get(get_payment_request).options(options_payment_request),
        )
        .with_state(state)
}

/// Error body of the initiator endpoint
#[derive(Debug, Serialize)]
pub struct InitiatorErrorBody {
    pub success: bool,
    pub message: String,
    pub error: crate::error::ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl InitiatorErrorBody {
    fn from_app_error(error: &AppError) -> Self {
        Self {
            success: false,
            message: error.user_message(),
            error: error.error_code(),
            details: error.details(),
            request_id: error.request_id.clone(),
        }
    }
}

/// Snapshot of a payment request for client polling
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusView {
    pub id: String,
    pub status: String,
    pub payment_type: String,
    pub amount: BigDecimal,
    pub checkout_request_id: Option<String>,
    pub merchant_request_id: Option<String>,
    pub result_code: Option<i32>,
    pub result_desc: Option<String>,
}

impl From<PaymentRequest> for PaymentStatusView {
    fn from(request: PaymentRequest) -> Self {
        Self {
            id: request.id,
            status: request.status.as_str().to_string(),
            payment_type: request.payment_type,
            amount: request.amount,
            checkout_request_id: request.checkout_request_id,
            merchant_request_id: request.merchant_request_id,
            result_code: request.result_code,
            result_desc: request.result_desc,
        }
    }
}

/// POST /api/payments/stk-push
pub async fn initiate_stk_push(
    State(state): State<PaymentsState>,
    headers: HeaderMap,
    payload: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Response {
    let request_id = get_request_id_from_headers(&headers);
    let mut response_headers = browser_headers(&state.allowed_origin, "POST, OPTIONS");

    let result = match payload {
        Ok(Json(body)) => state.initiator.initiate(&body).await,
        Err(rejection) => Err(AppError::validation(ValidationError::MalformedBody {
            reason: rejection.body_text(),
        })),
    };

    match result {
        Ok(outcome) => {
            info!(
                success = outcome.success,
                checkout_request_id = outcome.checkout_request_id.as_deref().unwrap_or("-"),
                "stk push request handled"
            );
            (StatusCode::OK, response_headers, Json(outcome)).into_response()
        }
        Err(error) => {
            let error = match request_id {
                Some(id) => error.with_request_id(id),
                None => error,
            };
            log_app_error(&error);
            response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            (
                status_of(&error),
                response_headers,
                Json(InitiatorErrorBody::from_app_error(&error)),
            )
                .into_response()
        }
    }
}

/// OPTIONS /api/payments/stk-push
pub async fn options_stk_push(State(state): State<PaymentsState>) -> Response {
    (
        StatusCode::NO_CONTENT,
        browser_headers(&state.allowed_origin, "POST, OPTIONS"),
    )
        .into_response()
}

/// GET /api/payments/requests/{id}
pub async fn get_payment_request(
    State(state): State<PaymentsState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let request_id = get_request_id_from_headers(&headers);
    let response_headers = browser_headers(&state.allowed_origin, "GET, OPTIONS");

    let result = match state.store.find_payment_request(id.trim()).await {
        Ok(Some(request)) => Ok(PaymentStatusView::from(request)),
        Ok(None) => Err(AppError::domain(DomainError::PaymentRequestNotFound {
            payment_request_id: id.trim().to_string(),
        })),
        Err(e) => Err(AppError::from(e)),
    };

    match result {
        Ok(view) => (StatusCode::OK, response_headers, Json(view)).into_response(),
        Err(error) => {
            let error = match request_id {
                Some(id) => error.with_request_id(id),
                None => error,
            };
            log_app_error(&error);
            (
                status_of(&error),
                response_headers,
                Json(ErrorResponse::from_app_error(&error)),
            )
                .into_response()
        }
    }
}

/// OPTIONS /api/payments/requests/{id}
pub async fn options_payment_request(State(state): State<PaymentsState>) -> Response {
    (
        StatusCode::NO_CONTENT,
        browser_headers(&state.allowed_origin, "GET, OPTIONS"),
    )
        .into_response()
}

fn browser_headers(allowed_origin: &HeaderValue, methods: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    add_cors_headers(&mut headers, allowed_origin, methods);
    add_security_headers(&mut headers);
    headers
}

fn add_cors_headers(headers: &mut HeaderMap, allowed_origin: &HeaderValue, methods: &'static str) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allowed_origin.clone());
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(methods),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
}

fn add_security_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        HeaderName::from_static("x-xss-protection"),
        HeaderValue::from_static("1; mode=block"),
    );
}
