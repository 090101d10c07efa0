use rust_decimal::{Decimal, RoundingStrategy};

use crate::coupons::models::{Coupon, CouponContext, DiscountCalculation};
use crate::coupons::rules::RuleFault;
use crate::coupons::types::DiscountType;

/// Currency amounts are kept to two decimal places
const CURRENCY_SCALE: u32 = 2;

/// Round a currency amount to minor units, midpoint away from zero
///
/// 0.005 rounds to 0.01 and -0.005 rounds to -0.01.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Pure discount computation for coupons that already passed validation
///
/// Never use this to decide whether a coupon is valid.
pub struct DiscountCalculator;

impl DiscountCalculator {
    /// Calculate the discount and final total for a coupon
    ///
    /// # Algorithm
    /// - Percentage: `order_total * value / 100`, capped by `maximum_discount_amount`
    /// - Fixed amount: `min(value, order_total)`
    /// - Rounded to 2 places, then clamped to `[0, order_total]`
    /// - `final_total = order_total - discount`, exactly
    ///
    /// Fails only when the amounts are too large to multiply.
    pub fn calculate(coupon: &Coupon, context: &CouponContext) -> Result<DiscountCalculation, RuleFault> {
        let order_total = context.order_total.max(Decimal::ZERO);

        let raw = match coupon.discount_type {
            DiscountType::Percentage => {
                let raw = order_total
                    .checked_mul(coupon.value)
                    .and_then(|amount| amount.checked_div(Decimal::ONE_HUNDRED))
                    .ok_or_else(|| {
                        RuleFault(format!(
                            "{}% of {} overflows the discount calculation",
                            coupon.value, order_total
                        ))
                    })?;
                match coupon.maximum_discount_amount {
                    Some(cap) if raw > cap => cap,
                    _ => raw,
                }
            }
            DiscountType::FixedAmount => coupon.value.min(order_total),
        };

        // Clamp after rounding so a rounded-up discount never passes the total
        let discount_amount = round_currency(raw.max(Decimal::ZERO)).min(order_total);
        let final_total = order_total - discount_amount;

        Ok(DiscountCalculation {
            discount_amount,
            final_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn coupon(discount_type: DiscountType, value: Decimal) -> Coupon {
        Coupon {
            id: Uuid::new_v4(),
            code: "TEST".to_string(),
            discount_type,
            value,
            minimum_order_value: None,
            maximum_discount_amount: None,
            usage_limit: None,
            used_count: 0,
            usage_limit_per_customer: None,
            is_active: true,
            start_date: Utc::now(),
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
    fn test_percentage_discount() {
        let c = coupon(DiscountType::Percentage, dec!(10));
        let result = DiscountCalculator::calculate(&c, &CouponContext::with_total(dec!(80))).unwrap();
        assert_eq!(result.discount_amount, dec!(8.00));
        assert_eq!(result.final_total, dec!(72.00));
    }

    #[test]
    fn test_percentage_discount_capped() {
        let mut c = coupon(DiscountType::Percentage, dec!(50));
        c.maximum_discount_amount = Some(dec!(15));
        let result = DiscountCalculator::calculate(&c, &CouponContext::with_total(dec!(100))).unwrap();
        assert_eq!(result.discount_amount, dec!(15));
        assert_eq!(result.final_total, dec!(85));
    }

    #[test]
    fn test_zero_cap_disables_percentage_discount() {
        let mut c = coupon(DiscountType::Percentage, dec!(20));
        c.maximum_discount_amount = Some(dec!(0));
        let result = DiscountCalculator::calculate(&c, &CouponContext::with_total(dec!(100))).unwrap();
        assert_eq!(result.discount_amount, dec!(0));
        assert_eq!(result.final_total, dec!(100));
    }

    #[test]
    fn test_cap_ignored_for_fixed_amount() {
        let mut c = coupon(DiscountType::FixedAmount, dec!(30));
        c.maximum_discount_amount = Some(dec!(5));
        let result = DiscountCalculator::calculate(&c, &CouponContext::with_total(dec!(100))).unwrap();
        assert_eq!(result.discount_amount, dec!(30));
    }

    #[test]
    fn test_fixed_amount_never_exceeds_total() {
        let c = coupon(DiscountType::FixedAmount, dec!(50));
        let result = DiscountCalculator::calculate(&c, &CouponContext::with_total(dec!(35.40))).unwrap();
        assert_eq!(result.discount_amount, dec!(35.40));
        assert_eq!(result.final_total, dec!(0));
    }

    #[test]
    fn test_zero_order_total() {
        let c = coupon(DiscountType::FixedAmount, dec!(20));
        let result = DiscountCalculator::calculate(&c, &CouponContext::with_total(dec!(0))).unwrap();
        assert_eq!(result.discount_amount, dec!(0));
        assert_eq!(result.final_total, dec!(0));
    }

    #[test]
    fn test_zero_percentage() {
        let c = coupon(DiscountType::Percentage, dec!(0));
        let result = DiscountCalculator::calculate(&c, &CouponContext::with_total(dec!(49.99))).unwrap();
        assert_eq!(result.discount_amount, dec!(0));
        assert_eq!(result.final_total, dec!(49.99));
    }

    #[test]
    fn test_rounding_midpoint_away_from_zero() {
        // 10% of 0.05 = 0.005
        let c = coupon(DiscountType::Percentage, dec!(10));
        let result = DiscountCalculator::calculate(&c, &CouponContext::with_total(dec!(0.05))).unwrap();
        assert_eq!(result.discount_amount, dec!(0.01));
        assert_eq!(result.final_total, dec!(0.04));

        // 15% of 10.10 = 1.515
        let c = coupon(DiscountType::Percentage, dec!(15));
        let result = DiscountCalculator::calculate(&c, &CouponContext::with_total(dec!(10.10))).unwrap();
        assert_eq!(result.discount_amount, dec!(1.52));
        assert_eq!(result.final_total, dec!(8.58));
    }

    #[test]
    fn test_round_currency() {
        assert_eq!(round_currency(dec!(2.345)), dec!(2.35));
        assert_eq!(round_currency(dec!(2.344)), dec!(2.34));
        assert_eq!(round_currency(dec!(-2.345)), dec!(-2.35));
    }

    #[test]
    fn test_negative_total_is_treated_as_zero() {
        let c = coupon(DiscountType::FixedAmount, dec!(5));
        let result = DiscountCalculator::calculate(&c, &CouponContext::with_total(dec!(-10))).unwrap();
        assert_eq!(result.discount_amount, dec!(0));
        assert_eq!(result.final_total, dec!(0));
    }

    #[test]
    fn test_overflowing_percentage_is_a_fault() {
        let c = coupon(DiscountType::Percentage, dec!(50));
        let result = DiscountCalculator::calculate(&c, &CouponContext::with_total(Decimal::MAX));
        assert!(result.is_err());
    }

    #[test]
    fn test_largest_storable_total() {
        let c = coupon(DiscountType::Percentage, dec!(100));
        let total = dec!(9999999999.99);
        let result = DiscountCalculator::calculate(&c, &CouponContext::with_total(total)).unwrap();
        assert_eq!(result.discount_amount, total);
        assert_eq!(result.final_total, dec!(0));
    }

    #[test]
    fn test_sub_cent_total_never_grows() {
        let c = coupon(DiscountType::Percentage, dec!(0));
        let result = DiscountCalculator::calculate(&c, &CouponContext::with_total(dec!(10.005))).unwrap();
        assert_eq!(result.discount_amount, dec!(0));
        assert_eq!(result.final_total, dec!(10.005));

        let c = coupon(DiscountType::FixedAmount, dec!(20));
        let result = DiscountCalculator::calculate(&c, &CouponContext::with_total(dec!(10.005))).unwrap();
        assert_eq!(result.discount_amount, dec!(10.005));
        assert_eq!(result.final_total, dec!(0));
    }

    #[test]
    fn test_calculation_is_idempotent() {
        let c = coupon(DiscountType::Percentage, dec!(12.5));
        let context = CouponContext::with_total(dec!(73.19));
        let first = DiscountCalculator::calculate(&c, &context).unwrap();
        let second = DiscountCalculator::calculate(&c, &context).unwrap();
        assert_eq!(first, second);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn coupon(discount_type: DiscountType, value: Decimal, cap: Option<Decimal>) -> Coupon {
        Coupon {
            id: Uuid::new_v4(),
            code: "PROP".to_string(),
            discount_type,
            value,
            minimum_order_value: None,
            maximum_discount_amount: cap,
            usage_limit: None,
            used_count: 0,
            usage_limit_per_customer: None,
            is_active: true,
            start_date: Utc::now(),
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

    fn cents(value: u32) -> Decimal {
        Decimal::new(value as i64, 2)
    }

    /// Percentage discounts equal the rounded percentage, capped, and never exceed the total
    #[test]
    fn prop_percentage_discount() {
        proptest!(|(
            total_cents in 0u32..=1_000_000,
            percent_hundredths in 0u32..=10_000,
            cap_cents in proptest::option::of(0u32..=50_000)
        )| {
            let total = cents(total_cents);
            let value = cents(percent_hundredths);
            let cap = cap_cents.map(cents);
            let c = coupon(DiscountType::Percentage, value, cap);

            let result = DiscountCalculator::calculate(&c, &CouponContext::with_total(total)).unwrap();

            let mut expected = total * value / Decimal::ONE_HUNDRED;
            if let Some(cap) = cap {
                expected = expected.min(cap);
            }
            prop_assert_eq!(result.discount_amount, round_currency(expected).min(total));
            prop_assert!(result.discount_amount <= total);
        });
    }

    /// Fixed discounts equal min(value, total)
    #[test]
    fn prop_fixed_discount() {
        proptest!(|(
            total_cents in 0u32..=1_000_000,
            value_cents in 0u32..=1_000_000
        )| {
            let total = cents(total_cents);
            let value = cents(value_cents);
            let c = coupon(DiscountType::FixedAmount, value, None);

            let result = DiscountCalculator::calculate(&c, &CouponContext::with_total(total)).unwrap();

            prop_assert_eq!(result.discount_amount, value.min(total));
        });
    }

    /// final_total = order_total - discount_amount and 0 <= final_total <= order_total
    ///
    /// Totals carry up to four decimal places so sub-cent inputs are covered.
    #[test]
    fn prop_final_total_bounds() {
        proptest!(|(
            total_units in 0u32..=100_000_000,
            total_scale in 0u32..=4,
            value_cents in 0u32..=1_000_000,
            is_percentage in any::<bool>()
        )| {
            let total = Decimal::new(total_units as i64, total_scale);
            let (discount_type, value) = if is_percentage {
                (DiscountType::Percentage, cents(value_cents % 10_001))
            } else {
                (DiscountType::FixedAmount, cents(value_cents))
            };
            let c = coupon(discount_type, value, None);

            let result = DiscountCalculator::calculate(&c, &CouponContext::with_total(total)).unwrap();

            prop_assert_eq!(result.final_total, total - result.discount_amount);
            prop_assert!(result.final_total >= Decimal::ZERO);
            prop_assert!(result.final_total <= total);
        });
    }
}
