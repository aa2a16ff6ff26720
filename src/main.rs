use axum::http::HeaderValue;
use club_payments::api::{self, AppServices};
use club_payments::config::AppConfig;
use club_payments::database::{self, init_pool_from_config, store::PgPaymentStore};
use club_payments::health::HealthChecker;
use club_payments::logging::init_tracing;
use club_payments::payments::providers::MpesaProvider;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mpesa_environment = ?config.mpesa.environment,
        mpesa_base_url = %config.mpesa.base_url(),
        "🚀 Starting club payments service"
    );

    info!("📊 Initializing database connection pool...");
    let db_pool = init_pool_from_config(&config.database).await.map_err(|e| {
        error!("❌ Failed to initialize database pool: {}", e);
        e
    })?;
    info!(
        max_connections = db_pool.options().get_max_connections(),
        "✅ Database connection pool initialized"
    );

    if config.database.run_migrations {
        info!("🗄️  Running database migrations...");
        database::run_migrations(&db_pool).await?;
    }

    let gateway = MpesaProvider::new(config.mpesa.provider_config())?;
    info!(
        timeout_secs = config.mpesa.timeout_secs,
        max_retries = config.mpesa.max_retries,
        "✅ M-Pesa gateway ready"
    );

    let app = api::router(AppServices {
        store: Arc::new(PgPaymentStore::new(db_pool.clone())),
        gateway: Arc::new(gateway),
        health_checker: HealthChecker::new(db_pool),
        allowed_origin: HeaderValue::from_str(&config.server.allowed_origin)?,
    });
    info!("✅ Routes configured");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(
        address = %addr,
        allowed_origin = %config.server.allowed_origin,
        "🚀 Server listening on http://{}",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");

    Ok(())
}
