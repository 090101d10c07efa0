use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use marketplace_coupons::config::AppConfig;
use marketplace_coupons::coupons::{CouponMetrics, CouponService, PgCouponRepository};
use marketplace_coupons::error::AppError;
use marketplace_coupons::{create_router, db, AppState};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // RUST_LOG controls verbosity, defaulting to info
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Marketplace coupons - Starting...");

    let config = AppConfig::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;

    let metrics = CouponMetrics::new();
    let service = CouponService::new(
        Arc::new(PgCouponRepository::new(pool)),
        metrics.clone(),
        config.service_config(),
    );
    let app = create_router(AppState { coupons: service });

    let addr = config.bind_address();
    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Coupon API is running on http://{}", addr);
    axum::serve(listener, app).await?;

    metrics.log_summary();
    Ok(())
}
