// HTTP handlers for coupon endpoints
// Authentication is handled upstream; the user id arrives already resolved

use axum::{extract::State, http::StatusCode, Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::coupons::metrics::MetricsSummary;
use crate::coupons::{
    AutoCouponSuggestion, CartItem, Coupon, CouponContext, CouponError, CouponResult,
    CouponValidation, NewCoupon, Redemption,
};
use crate::validation::{validate_coupon_code, validate_order_total};
use crate::AppState;

/// Checkout snapshot shared by all coupon requests
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CheckoutRequest {
    /// Defaults to the sum of `items` when omitted
    #[serde(default, alias = "cart_total")]
    #[validate(custom = "validate_order_total")]
    pub order_total: Option<Decimal>,
    #[serde(default)]
    #[validate]
    pub items: Vec<CartItem>,
    pub store_id: Option<Uuid>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub product_ids: Vec<Uuid>,
    pub user_id: Option<Uuid>,
}

impl CheckoutRequest {
    /// Build the engine context, merging explicit fields over cart-derived ones
    pub fn into_context(self) -> CouponResult<CouponContext> {
        if self.order_total.is_none() && self.items.is_empty() {
            return Err(CouponError::ValidationError(
                "order_total or items is required".to_string(),
            ));
        }

        let mut context = CouponContext::from_items(self.items)?;
        if let Some(order_total) = self.order_total {
            context.order_total = order_total;
        }
        if let Some(store_id) = self.store_id {
            context.store_id = Some(store_id);
        }
        for category in self.categories {
            if !context.categories.contains(&category) {
                context.categories.push(category);
            }
        }
        for product_id in self.product_ids {
            if !context.product_ids.contains(&product_id) {
                context.product_ids.push(product_id);
            }
        }
        context.user_id = self.user_id;

        Ok(context)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1, max = 50), custom = "validate_coupon_code")]
    pub code: String,
    #[serde(flatten)]
    #[validate]
    pub checkout: CheckoutRequest,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RedeemCouponRequest {
    #[validate(length(min = 1, max = 50), custom = "validate_coupon_code")]
    pub code: String,
    pub order_id: Uuid,
    #[serde(flatten)]
    #[validate]
    pub checkout: CheckoutRequest,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AutoApplyResponse {
    pub suggestion: Option<AutoCouponSuggestion>,
}

/// Handler for POST /api/coupons/validate
/// Returns 200 with the full validation result, valid or not
pub async fn validate_coupon_handler(
    State(state): State<AppState>,
    Json(request): Json<ValidateCouponRequest>,
) -> Result<Json<CouponValidation>, CouponError> {
    request.validate()?;
    let context = request.checkout.into_context()?;

    let validation = state.coupons.validate_code(&request.code, context).await?;
    Ok(Json(validation))
}

/// Handler for POST /api/coupons/redeem
pub async fn redeem_coupon_handler(
    State(state): State<AppState>,
    Json(request): Json<RedeemCouponRequest>,
) -> Result<Json<Redemption>, CouponError> {
    request.validate()?;
    let context = request.checkout.into_context()?;

    let redemption = state
        .coupons
        .redeem(&request.code, context, request.order_id)
        .await?;
    Ok(Json(redemption))
}

/// Handler for POST /api/coupons/auto-apply
pub async fn auto_apply_handler(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<AutoApplyResponse>, CouponError> {
    request.validate()?;
    let context = request.into_context()?;

    let suggestion = state.coupons.suggest_auto_coupon(context).await?;
    Ok(Json(AutoApplyResponse { suggestion }))
}

/// Handler for POST /api/coupons
pub async fn create_coupon_handler(
    State(state): State<AppState>,
    Json(request): Json<NewCoupon>,
) -> Result<(StatusCode, Json<Coupon>), CouponError> {
    let coupon = state.coupons.create_coupon(request).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

/// Handler for GET /api/coupons/metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsSummary> {
    Json(state.coupons.metrics().summary())
}
