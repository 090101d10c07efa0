// Auto-Apply Selector
// Picks the coupon to apply silently when the customer entered no code

use chrono::{DateTime, Utc};

use crate::coupons::calculator::DiscountCalculator;
use crate::coupons::models::{Coupon, CouponContext, DiscountCalculation};
use crate::coupons::usage::UsageLimitEnforcer;

pub struct AutoApplySelector;

impl AutoApplySelector {
    /// Filter candidates eligible for automatic application, keeping input order
    pub fn find_applicable_auto_coupons<'a>(
        coupons: &'a [Coupon],
        context: &CouponContext,
    ) -> Vec<&'a Coupon> {
        Self::find_applicable_auto_coupons_at(coupons, context, Utc::now())
    }

    pub fn find_applicable_auto_coupons_at<'a>(
        coupons: &'a [Coupon],
        context: &CouponContext,
        now: DateTime<Utc>,
    ) -> Vec<&'a Coupon> {
        coupons
            .iter()
            .filter(|coupon| Self::is_candidate(coupon, context, now))
            .collect()
    }

    /// Coupon with the strictly greatest discount; ties keep the first encountered
    pub fn find_best_coupon<'a>(coupons: &'a [Coupon], context: &CouponContext) -> Option<&'a Coupon> {
        Self::select_best_at(coupons, context, Utc::now()).map(|(coupon, _)| coupon)
    }

    /// Best candidate together with its computed discount
    ///
    /// Returns `None` when nothing is eligible or every candidate yields zero.
    pub fn select_best_at<'a>(
        coupons: &'a [Coupon],
        context: &CouponContext,
        now: DateTime<Utc>,
    ) -> Option<(&'a Coupon, DiscountCalculation)> {
        let mut best: Option<(&'a Coupon, DiscountCalculation)> = None;

        for coupon in Self::find_applicable_auto_coupons_at(coupons, context, now) {
            let calculation = match DiscountCalculator::calculate(coupon, context) {
                Ok(calculation) => calculation,
                Err(fault) => {
                    tracing::warn!("Skipping auto-apply candidate {}: {}", coupon.code, fault);
                    continue;
                }
            };
            tracing::debug!(
                "Auto-apply candidate {} yields discount {}",
                coupon.code,
                calculation.discount_amount
            );

            if calculation.discount_amount.is_zero() {
                continue;
            }

            let better = match best {
                Some((_, ref current)) => calculation.discount_amount > current.discount_amount,
                None => true,
            };
            if better {
                best = Some((coupon, calculation));
            }
        }

        best
    }

    fn is_candidate(coupon: &Coupon, context: &CouponContext, now: DateTime<Utc>) -> bool {
        if !coupon.is_auto_apply {
            return false;
        }
        if !UsageLimitEnforcer::quick_validate_at(coupon, context, now) {
            return false;
        }
        if coupon.auto_apply_first_purchase && !context.is_first_purchase {
            return false;
        }
        match coupon.auto_apply_category {
            Some(ref category) => context.categories.contains(category),
            None => true,
        }
    }
}
