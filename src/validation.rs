// Validation utilities module
// Provides custom validation functions for domain-specific rules

use regex::Regex;
use rust_decimal::Decimal;
use std::sync::OnceLock;
use validator::ValidationError;

fn coupon_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("coupon code pattern is valid"))
}

/// Validates that a coupon code only uses letters, digits, '-' and '_'
/// Surrounding whitespace is tolerated since codes are trimmed before storage
pub fn validate_coupon_code(code: &str) -> Result<(), ValidationError> {
    if coupon_code_pattern().is_match(code.trim()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_coupon_code"))
    }
}

/// Largest amount a `NUMERIC(12, 2)` column can hold, in cents
const MAX_CURRENCY_CENTS: i64 = 999_999_999_999;

/// 9,999,999,999.99
pub fn max_currency_amount() -> Decimal {
    Decimal::new(MAX_CURRENCY_CENTS, 2)
}

/// Validates a currency amount: non-negative, whole cents, storable
fn validate_currency_amount(amount: &Decimal, negative_code: &'static str) -> Result<(), ValidationError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ValidationError::new(negative_code));
    }
    if amount.normalize().scale() > 2 {
        return Err(ValidationError::new("amount_has_sub_cent_precision"));
    }
    if *amount > max_currency_amount() {
        return Err(ValidationError::new("amount_too_large"));
    }
    Ok(())
}

/// Validates an order total
pub fn validate_order_total(total: &Decimal) -> Result<(), ValidationError> {
    validate_currency_amount(total, "order_total_must_not_be_negative")
}

/// Validates the unit price of a cart line
pub fn validate_item_price(price: &Decimal) -> Result<(), ValidationError> {
    validate_currency_amount(price, "price_must_not_be_negative")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_coupon_code_accepts_common_formats() {
        assert!(validate_coupon_code("SUMMER10").is_ok());
        assert!(validate_coupon_code("welcome_5").is_ok());
        assert!(validate_coupon_code(" BLACK-FRIDAY ").is_ok());
    }

    #[test]
    fn test_coupon_code_rejects_symbols() {
        assert!(validate_coupon_code("10% OFF").is_err());
        assert!(validate_coupon_code("").is_err());
        assert!(validate_coupon_code("drop;table").is_err());
    }

    #[test]
    fn test_order_total() {
        assert!(validate_order_total(&dec!(0)).is_ok());
        assert!(validate_order_total(&dec!(19.99)).is_ok());
        assert!(validate_order_total(&dec!(19.9900)).is_ok());
        assert!(validate_order_total(&dec!(-0.01)).is_err());
    }

    #[test]
    fn test_order_total_bounds() {
        assert_eq!(max_currency_amount(), dec!(9999999999.99));
        assert!(validate_order_total(&dec!(9999999999.99)).is_ok());
        assert!(validate_order_total(&dec!(10000000000.00)).is_err());
        assert!(validate_order_total(&Decimal::MAX).is_err());
        assert!(validate_order_total(&dec!(10.005)).is_err());
    }

    #[test]
    fn test_item_price() {
        assert!(validate_item_price(&dec!(0)).is_ok());
        assert!(validate_item_price(&dec!(12.50)).is_ok());
        assert!(validate_item_price(&dec!(-100)).is_err());
        assert!(validate_item_price(&dec!(0.001)).is_err());
    }
}
