use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::services::callback_processor::{CallbackError, CallbackOutcome, CallbackProcessor};

pub struct CallbackState {
    pub processor: Arc<CallbackProcessor>,
}

pub fn routes(state: Arc<CallbackState>) -> Router {
    Router::new()
        .route("/api/payments/mpesa/callback", any(handle_mpesa_callback))
        .with_state(state)
}

/// /api/payments/mpesa/callback
///
/// Daraja treats anything but a 2xx as undelivered, so only callbacks we
/// could not act on get an error status.
pub async fn handle_mpesa_callback(
    State(state): State<Arc<CallbackState>>,
    method: Method,
    body: String,
) -> Response {
    if method != Method::POST {
        warn!(method = %method, "rejecting non-POST callback");
        return (StatusCode::BAD_REQUEST, "Method not allowed").into_response();
    }

    match state.processor.process(&body).await {
        Ok(outcome) => {
            match outcome {
                CallbackOutcome::Completed => info!("M-Pesa callback settled payment"),
                CallbackOutcome::Failed => info!("M-Pesa callback recorded failed payment"),
                CallbackOutcome::AlreadyProcessed => info!("M-Pesa callback already processed"),
            }
            (StatusCode::OK, "OK").into_response()
        }
        Err(e @ CallbackError::Database(_)) => {
            error!(error = %e, "M-Pesa callback processing failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
        Err(e) => {
            let status = StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if status.is_server_error() {
                error!(error = %e, "M-Pesa callback processing failed");
            } else {
                warn!(error = %e, "M-Pesa callback rejected");
            }
            (status, e.to_string()).into_response()
        }
    }
}
