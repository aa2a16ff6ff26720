//! HTTP surface of the service

pub mod health;
pub mod mpesa_callback;
pub mod payments;

use crate::database::store::PaymentStore;
use crate::health::HealthChecker;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::payments::provider::StkPushGateway;
use crate::services::callback_processor::CallbackProcessor;
use crate::services::payment_initiator::PaymentInitiator;
use axum::http::HeaderValue;
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};

/// Shared handles the routes are built from
#[derive(Clone)]
pub struct AppServices {
    pub store: Arc<dyn PaymentStore>,
    pub gateway: Arc<dyn StkPushGateway>,
    pub health_checker: HealthChecker,
    pub allowed_origin: HeaderValue,
}

/// Full application router with request-id and access-log layers
pub fn router(services: AppServices) -> Router {
    let payments_state = payments::PaymentsState {
        initiator: Arc::new(PaymentInitiator::new(
            services.store.clone(),
            services.gateway.clone(),
        )),
        store: services.store.clone(),
        allowed_origin: services.allowed_origin,
    };
    let callback_state = Arc::new(mpesa_callback::CallbackState {
        processor: Arc::new(CallbackProcessor::new(services.store)),
    });

    Router::new()
        .route("/", axum::routing::get(root))
        .merge(health::routes(services.health_checker))
        .merge(payments::routes(payments_state))
        .merge(mpesa_callback::routes(callback_state))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

async fn root() -> &'static str {
    "Club payments API"
}
