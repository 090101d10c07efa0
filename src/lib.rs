pub mod config;
pub mod coupons;
pub mod db;
pub mod error;
pub mod validation;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use coupons::handlers;
use coupons::CouponService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub coupons: CouponService,
}

/// Build the HTTP router for the coupon API
pub fn create_router(state: AppState) -> Router {
    // Configure CORS to allow all origins, methods, and headers
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/coupons", post(handlers::create_coupon_handler))
        .route("/api/coupons/validate", post(handlers::validate_coupon_handler))
        .route("/api/coupons/redeem", post(handlers::redeem_coupon_handler))
        .route("/api/coupons/auto-apply", post(handlers::auto_apply_handler))
        .route("/api/coupons/metrics", get(handlers::metrics_handler))
        .layer(cors)
        .with_state(state)
}
