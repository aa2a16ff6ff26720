use crate::health::{HealthChecker, HealthStatus};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::{error, info};

pub fn routes(health_checker: HealthChecker) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .with_state(health_checker)
}

async fn health(
    State(checker): State<HealthChecker>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    info!("🏥 Health check requested");
    let health_status = checker.check_health().await;

    if health_status.is_healthy() {
        info!("✅ Health check passed");
        Ok(Json(health_status))
    } else {
        error!("❌ Health check failed - service unhealthy");
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(health_status)))
    }
}

/// Readiness probe - the service can take traffic once the database answers
async fn readiness(
    state: State<HealthChecker>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    info!("🔍 Readiness probe requested");
    health(state).await
}

async fn liveness() -> &'static str {
    "OK"
}
