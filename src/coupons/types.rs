// Domain type definitions for the coupon engine
// Shared enums used by the rule chain, calculator, repository and handlers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of the discount a coupon grants
///
/// Determines how `Coupon::value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// Value is percentage points of the order total (e.g., 10 = 10% off)
    Percentage,

    /// Value is a currency amount subtracted from the order total (e.g., 5.00 = 5 off)
    FixedAmount,
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountType::Percentage => write!(f, "percentage"),
            DiscountType::FixedAmount => write!(f, "fixed_amount"),
        }
    }
}

impl std::str::FromStr for DiscountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(DiscountType::Percentage),
            "fixed_amount" => Ok(DiscountType::FixedAmount),
            _ => Err(format!("Invalid discount type: {}", s)),
        }
    }
}

/// How a coupon reference handed to the repository should be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    /// Human-entered code, matched case-insensitively
    Code,

    /// Stable coupon id
    Id,
}

/// Closed taxonomy of reasons a coupon can be rejected
///
/// Each variant is a stable, machine-readable code carried in
/// `CouponValidation::errors`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponErrorCode {
    CouponNotFound,
    CouponInactive,
    CouponExpired,
    CouponNotStarted,
    UsageLimitExceeded,
    UserLimitExceeded,
    MinimumOrderValueNotMet,
    StoreRestriction,
    CategoryRestriction,
    ProductRestriction,
    FirstPurchaseOnly,
    /// A single rule faulted while evaluating
    ValidationError,
}

impl CouponErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponErrorCode::CouponNotFound => "COUPON_NOT_FOUND",
            CouponErrorCode::CouponInactive => "COUPON_INACTIVE",
            CouponErrorCode::CouponExpired => "COUPON_EXPIRED",
            CouponErrorCode::CouponNotStarted => "COUPON_NOT_STARTED",
            CouponErrorCode::UsageLimitExceeded => "USAGE_LIMIT_EXCEEDED",
            CouponErrorCode::UserLimitExceeded => "USER_LIMIT_EXCEEDED",
            CouponErrorCode::MinimumOrderValueNotMet => "MINIMUM_ORDER_VALUE_NOT_MET",
            CouponErrorCode::StoreRestriction => "STORE_RESTRICTION",
            CouponErrorCode::CategoryRestriction => "CATEGORY_RESTRICTION",
            CouponErrorCode::ProductRestriction => "PRODUCT_RESTRICTION",
            CouponErrorCode::FirstPurchaseOnly => "FIRST_PURCHASE_ONLY",
            CouponErrorCode::ValidationError => "VALIDATION_ERROR",
        }
    }
}

impl fmt::Display for CouponErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CouponErrorCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COUPON_NOT_FOUND" => Ok(CouponErrorCode::CouponNotFound),
            "COUPON_INACTIVE" => Ok(CouponErrorCode::CouponInactive),
            "COUPON_EXPIRED" => Ok(CouponErrorCode::CouponExpired),
            "COUPON_NOT_STARTED" => Ok(CouponErrorCode::CouponNotStarted),
            "USAGE_LIMIT_EXCEEDED" => Ok(CouponErrorCode::UsageLimitExceeded),
            "USER_LIMIT_EXCEEDED" => Ok(CouponErrorCode::UserLimitExceeded),
            "MINIMUM_ORDER_VALUE_NOT_MET" => Ok(CouponErrorCode::MinimumOrderValueNotMet),
            "STORE_RESTRICTION" => Ok(CouponErrorCode::StoreRestriction),
            "CATEGORY_RESTRICTION" => Ok(CouponErrorCode::CategoryRestriction),
            "PRODUCT_RESTRICTION" => Ok(CouponErrorCode::ProductRestriction),
            "FIRST_PURCHASE_ONLY" => Ok(CouponErrorCode::FirstPurchaseOnly),
            "VALIDATION_ERROR" => Ok(CouponErrorCode::ValidationError),
            _ => Err(format!("Invalid coupon error code: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_discount_type_display() {
        assert_eq!(DiscountType::Percentage.to_string(), "percentage");
        assert_eq!(DiscountType::FixedAmount.to_string(), "fixed_amount");
    }

    #[test]
    fn test_discount_type_from_str() {
        assert_eq!(
            DiscountType::from_str("fixed_amount").unwrap(),
            DiscountType::FixedAmount
        );
        assert!(DiscountType::from_str("bogo").is_err());
    }

    #[test]
    fn test_error_code_serialization_matches_display() {
        let codes = [
            CouponErrorCode::CouponNotFound,
            CouponErrorCode::CouponInactive,
            CouponErrorCode::CouponExpired,
            CouponErrorCode::CouponNotStarted,
            CouponErrorCode::UsageLimitExceeded,
            CouponErrorCode::UserLimitExceeded,
            CouponErrorCode::MinimumOrderValueNotMet,
            CouponErrorCode::StoreRestriction,
            CouponErrorCode::CategoryRestriction,
            CouponErrorCode::ProductRestriction,
            CouponErrorCode::FirstPurchaseOnly,
            CouponErrorCode::ValidationError,
        ];

        for code in codes {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code));
            assert_eq!(CouponErrorCode::from_str(code.as_str()).unwrap(), code);
        }
    }

    #[test]
    fn test_discount_type_deserialization() {
        let parsed: DiscountType = serde_json::from_str("\"percentage\"").unwrap();
        assert_eq!(parsed, DiscountType::Percentage);
    }
}
