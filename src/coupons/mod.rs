// Coupon Engine Module
//
// Validates coupons against a checkout context, computes discounts, enforces
// usage limits and selects the best automatic coupon for a cart.
// - Rule chain: independent named rules, all evaluated, failures aggregated
// - Calculator: pure discount math in Decimal, rounded to 2 places
// - Usage enforcer: per-customer cap behind an injected async lookup
// - Auto-apply selector: highest discount among eligible automatic coupons
//
// Storage, HTTP and the end-to-end checkout flow live in `repository`,
// `handlers` and `service`.

pub mod types;
pub mod error;
pub mod models;
pub mod rules;
pub mod calculator;
pub mod usage;
pub mod auto_apply;
pub mod repository;
pub mod memory;
pub mod metrics;
pub mod service;
pub mod handlers;

// Re-export commonly used types for convenience
pub use error::{CouponError, CouponResult};
pub use types::{CouponErrorCode, DiscountType, IdentifierKind};
pub use models::{
    AutoCouponFilter,
    AutoCouponSuggestion,
    CartItem,
    Coupon,
    CouponContext,
    CouponUsageRecord,
    CouponValidation,
    DiscountCalculation,
    NewCoupon,
    Redemption,
    UsageCheck,
    ValidationIssue,
};
pub use rules::{CouponRule, RuleChain, RuleFault};
pub use calculator::{round_currency, DiscountCalculator};
pub use usage::UsageLimitEnforcer;
pub use auto_apply::AutoApplySelector;
pub use repository::{CouponRepository, PgCouponRepository};
pub use memory::InMemoryCouponRepository;
pub use metrics::CouponMetrics;
pub use service::{CouponService, CouponServiceConfig};

// Coupon Engine - Orchestrator
//
// Pure composition of the rule chain, calculator, selector and usage enforcer.
// Owns no repository handle: per-customer usage is checked separately by the
// caller through `validate_user_usage`.

use chrono::{DateTime, Utc};
use std::fmt::Display;
use std::future::Future;
use uuid::Uuid;

/// Rule name reported when the discount itself cannot be computed
pub const DISCOUNT_CALCULATION: &str = "discount_calculation";

#[derive(Debug, Clone, Default)]
pub struct CouponEngine {
    rules: RuleChain,
}

impl CouponEngine {
    /// Engine with the standard rule set
    pub fn new() -> Self {
        Self {
            rules: RuleChain::standard(),
        }
    }

    /// Engine with a custom rule chain
    pub fn with_rules(rules: RuleChain) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleChain {
        &self.rules
    }

    /// Validate a coupon (or its absence) against a checkout context
    ///
    /// Invalidity is a normal outcome: `is_valid = false` with every failing
    /// rule listed. The discount is only computed when all rules pass.
    pub fn validate_coupon(&self, coupon: Option<&Coupon>, context: &CouponContext) -> CouponValidation {
        self.validate_coupon_at(coupon, context, Utc::now())
    }

    pub fn validate_coupon_at(
        &self,
        coupon: Option<&Coupon>,
        context: &CouponContext,
        now: DateTime<Utc>,
    ) -> CouponValidation {
        let outcome = self.rules.evaluate(coupon, context, now);

        match coupon {
            Some(coupon) if outcome.passed() => match DiscountCalculator::calculate(coupon, context) {
                Ok(calculation) => CouponValidation {
                    is_valid: true,
                    errors: outcome.errors,
                    discount_amount: calculation.discount_amount,
                    final_total: calculation.final_total,
                    rules_evaluated: outcome.rules_evaluated,
                },
                Err(fault) => {
                    tracing::warn!("Discount for coupon {} could not be computed: {}", coupon.code, fault);
                    let mut validation = CouponValidation::rejected(
                        context.order_total,
                        outcome.errors,
                        outcome.rules_evaluated,
                    );
                    validation.errors.push(ValidationIssue::new(
                        CouponErrorCode::ValidationError,
                        format!("Discount could not be calculated: {}", fault),
                        DISCOUNT_CALCULATION,
                    ));
                    validation
                }
            },
            _ => CouponValidation::rejected(
                context.order_total,
                outcome.errors,
                outcome.rules_evaluated,
            ),
        }
    }

    /// Discount for a coupon that already passed validation
    pub fn calculate_discount(
        &self,
        coupon: &Coupon,
        context: &CouponContext,
    ) -> Result<DiscountCalculation, RuleFault> {
        DiscountCalculator::calculate(coupon, context)
    }

    pub fn find_best_auto_coupon<'a>(
        &self,
        coupons: &'a [Coupon],
        context: &CouponContext,
    ) -> Option<&'a Coupon> {
        AutoApplySelector::find_best_coupon(coupons, context)
    }

    pub async fn validate_user_usage<F, Fut, E>(
        &self,
        coupon: &Coupon,
        user_id: Uuid,
        get_user_usage_count: F,
    ) -> UsageCheck
    where
        F: FnOnce(Uuid, Uuid) -> Fut,
        Fut: Future<Output = Result<i64, E>>,
        E: Display,
    {
        UsageLimitEnforcer::validate_user_usage(coupon, user_id, get_user_usage_count).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use rust_decimal::Decimal;

    fn checkout_coupon() -> Coupon {
        Coupon {
            id: Uuid::new_v4(),
            code: "TWENTYOFF".to_string(),
            discount_type: DiscountType::FixedAmount,
            value: dec!(20),
            minimum_order_value: Some(dec!(50)),
            maximum_discount_amount: None,
            usage_limit: Some(100),
            used_count: 10,
            usage_limit_per_customer: None,
            is_active: true,
            start_date: Utc::now() - Duration::days(30),
            end_date: None,
            store_id: None,
            applicable_categories: vec![],
            applicable_products: vec![],
            applicable_stores: vec![],
            is_auto_apply: false,
            auto_apply_category: None,
            auto_apply_first_purchase: false,
        }
    }

    #[test]
    fn test_checkout_example_is_valid() {
        let engine = CouponEngine::new();
        let result = engine.validate_coupon(
            Some(&checkout_coupon()),
            &CouponContext::with_total(dec!(80)),
        );

        assert!(result.is_valid);
        assert!(result.errors.is_empty());
        assert_eq!(result.discount_amount, dec!(20.00));
        assert_eq!(result.final_total, dec!(60.00));
    }

    #[test]
    fn test_checkout_example_below_minimum() {
        let engine = CouponEngine::new();
        let result = engine.validate_coupon(
            Some(&checkout_coupon()),
            &CouponContext::with_total(dec!(15)),
        );

        assert!(!result.is_valid);
        assert_eq!(result.error_codes(), vec![CouponErrorCode::MinimumOrderValueNotMet]);
        assert_eq!(result.discount_amount, dec!(0));
        assert_eq!(result.final_total, dec!(15));
    }

    #[test]
    fn test_inactive_coupon_is_always_invalid() {
        let engine = CouponEngine::new();
        let mut coupon = checkout_coupon();
        coupon.is_active = false;

        let result = engine.validate_coupon(Some(&coupon), &CouponContext::with_total(dec!(80)));
        assert!(!result.is_valid);
        assert_eq!(result.error_codes(), vec![CouponErrorCode::CouponInactive]);
        assert_eq!(result.final_total, dec!(80));
    }

    #[test]
    fn test_missing_coupon() {
        let engine = CouponEngine::new();
        let result = engine.validate_coupon(None, &CouponContext::with_total(dec!(80)));
        assert!(!result.is_valid);
        assert!(result.has_error(CouponErrorCode::CouponNotFound));
    }

    #[test]
    fn test_no_end_date_never_expires() {
        let engine = CouponEngine::new();
        let far_future = Utc::now() + Duration::days(365 * 50);
        let result = engine.validate_coupon_at(
            Some(&checkout_coupon()),
            &CouponContext::with_total(dec!(80)),
            far_future,
        );
        assert!(!result.has_error(CouponErrorCode::CouponExpired));
    }

    #[test]
    fn test_oversized_total_is_rejected_not_panicking() {
        let engine = CouponEngine::new();
        let mut coupon = checkout_coupon();
        coupon.discount_type = DiscountType::Percentage;
        coupon.value = dec!(50);

        let result = engine.validate_coupon(Some(&coupon), &CouponContext::with_total(Decimal::MAX));
        assert!(!result.is_valid);
        assert_eq!(result.error_codes(), vec![CouponErrorCode::ValidationError]);
        assert_eq!(result.errors[0].rule, DISCOUNT_CALCULATION);
        assert_eq!(result.discount_amount, dec!(0));
        assert!(result.rules_evaluated.contains(&"minimum_order_value".to_string()));
    }

    #[test]
    fn test_calculate_discount_matches_validation() {
        let engine = CouponEngine::new();
        let coupon = checkout_coupon();
        let context = CouponContext::with_total(dec!(80));

        let calculation = engine.calculate_discount(&coupon, &context).unwrap();
        let validation = engine.validate_coupon(Some(&coupon), &context);
        assert_eq!(calculation.discount_amount, validation.discount_amount);
        assert_eq!(calculation.final_total, validation.final_total);
    }

    #[test]
    fn test_find_best_auto_coupon() {
        let engine = CouponEngine::new();
        let mut small = checkout_coupon();
        small.is_auto_apply = true;
        small.value = dec!(5);
        let mut large = checkout_coupon();
        large.is_auto_apply = true;
        large.code = "BIGGER".to_string();

        let coupons = vec![small, large];
        let best = engine.find_best_auto_coupon(&coupons, &CouponContext::with_total(dec!(80)));
        assert_eq!(best.map(|c| c.code.as_str()), Some("BIGGER"));
    }

    #[tokio::test]
    async fn test_validate_user_usage_delegates() {
        let engine = CouponEngine::new();
        let mut coupon = checkout_coupon();
        coupon.usage_limit_per_customer = Some(1);

        let check = engine
            .validate_user_usage(&coupon, Uuid::new_v4(), |_, _| async { Ok::<i64, String>(1) })
            .await;
        assert!(!check.is_valid);
    }
}
