// Usage Limit Enforcer
//
// Per-customer usage needs a repository round-trip, so it lives beside the
// synchronous rule chain rather than inside it. Lookup failures deny the coupon.

use chrono::{DateTime, Utc};
use std::fmt::Display;
use std::future::Future;
use uuid::Uuid;

use crate::coupons::models::{Coupon, CouponContext, UsageCheck, ValidationIssue};
use crate::coupons::rules::RuleChain;
use crate::coupons::types::CouponErrorCode;

/// Rule name reported on per-customer usage issues
pub const USER_USAGE_LIMIT: &str = "user_usage_limit";

pub struct UsageLimitEnforcer;

impl UsageLimitEnforcer {
    /// Check the per-customer cap for a user
    ///
    /// `get_user_usage_count` receives `(coupon_id, user_id)` and returns how many
    /// times the user has redeemed the coupon. No cap (or a cap <= 0) always
    /// passes without calling it. An `Err` from the lookup is a denial.
    pub async fn validate_user_usage<F, Fut, E>(
        coupon: &Coupon,
        user_id: Uuid,
        get_user_usage_count: F,
    ) -> UsageCheck
    where
        F: FnOnce(Uuid, Uuid) -> Fut,
        Fut: Future<Output = Result<i64, E>>,
        E: Display,
    {
        let limit = match coupon.usage_limit_per_customer {
            Some(limit) if limit > 0 => i64::from(limit),
            _ => return UsageCheck::allowed(),
        };

        match get_user_usage_count(coupon.id, user_id).await {
            Ok(count) if count < limit => UsageCheck::allowed(),
            Ok(count) => UsageCheck::denied(ValidationIssue::new(
                CouponErrorCode::UserLimitExceeded,
                format!(
                    "You have already used this coupon {} time(s); per-customer limit reached",
                    count
                ),
                USER_USAGE_LIMIT,
            )),
            Err(e) => {
                tracing::error!(
                    "Usage lookup failed for coupon {} and user {}: {}",
                    coupon.id,
                    user_id,
                    e
                );
                UsageCheck::denied(ValidationIssue::new(
                    CouponErrorCode::UserLimitExceeded,
                    "Unable to verify coupon usage for this customer",
                    USER_USAGE_LIMIT,
                ))
            }
        }
    }

    /// Synchronous pre-filter: active, started, not expired, global cap, minimum order
    pub fn quick_validate(coupon: &Coupon, context: &CouponContext) -> bool {
        Self::quick_validate_at(coupon, context, Utc::now())
    }

    pub fn quick_validate_at(coupon: &Coupon, context: &CouponContext, now: DateTime<Utc>) -> bool {
        RuleChain::quick().passes(coupon, context, now)
    }
}
