use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::coupons::types::{CouponErrorCode, DiscountType};
use crate::coupons::error::{CouponError, CouponResult};
use crate::validation::{validate_coupon_code, validate_item_price};

/// A redeemable discount definition
///
/// This is the engine's only view of a coupon. Storage rows are mapped into it
/// at the repository boundary (`repository::CouponRow`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    /// Stored uppercase; see `Coupon::normalize_code`
    pub code: String,
    #[serde(rename = "type")]
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub minimum_order_value: Option<Decimal>,
    /// Caps percentage discounts only
    pub maximum_discount_amount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub usage_limit_per_customer: Option<i32>,
    pub is_active: bool,
    pub start_date: DateTime<Utc>,
    /// None means the coupon never expires
    pub end_date: Option<DateTime<Utc>>,
    pub store_id: Option<Uuid>,
    #[serde(default)]
    pub applicable_categories: Vec<String>,
    #[serde(default)]
    pub applicable_products: Vec<Uuid>,
    #[serde(default)]
    pub applicable_stores: Vec<Uuid>,
    #[serde(default)]
    pub is_auto_apply: bool,
    pub auto_apply_category: Option<String>,
    #[serde(default)]
    pub auto_apply_first_purchase: bool,
}

impl Coupon {
    /// Normalize a human-entered code for lookup and storage
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }

    /// Check the record-level invariants a stored coupon must satisfy
    ///
    /// - `0 <= value`, and `value <= 100` for percentage coupons
    /// - `start_date <= end_date` when both are present
    /// - `used_count <= usage_limit` when a limit is set
    pub fn check_invariants(&self) -> Result<(), String> {
        check_definition(
            self.discount_type,
            self.value,
            self.minimum_order_value,
            self.maximum_discount_amount,
            self.start_date,
            self.end_date,
        )
        .map_err(|code| format!("coupon {}: {}", self.code, code))?;

        if self.used_count < 0 {
            return Err(format!("coupon {}: negative used_count", self.code));
        }

        if let Some(limit) = self.usage_limit {
            if self.used_count > limit {
                return Err(format!(
                    "coupon {}: used_count {} exceeds usage_limit {}",
                    self.code, self.used_count, limit
                ));
            }
        }

        Ok(())
    }

    /// Whether the global usage cap still has room
    pub fn has_remaining_uses(&self) -> bool {
        match self.usage_limit {
            Some(limit) => self.used_count < limit,
            None => true,
        }
    }
}

/// Shared definition checks for stored coupons and creation payloads
fn check_definition(
    discount_type: DiscountType,
    value: Decimal,
    minimum_order_value: Option<Decimal>,
    maximum_discount_amount: Option<Decimal>,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
) -> Result<(), &'static str> {
    if value < Decimal::ZERO {
        return Err("negative_value");
    }
    if discount_type == DiscountType::Percentage && value > Decimal::ONE_HUNDRED {
        return Err("percentage_above_100");
    }
    if minimum_order_value.map_or(false, |v| v < Decimal::ZERO) {
        return Err("negative_minimum_order_value");
    }
    if maximum_discount_amount.map_or(false, |v| v < Decimal::ZERO) {
        return Err("negative_maximum_discount_amount");
    }
    if let Some(end) = end_date {
        if start_date > end {
            return Err("start_after_end");
        }
    }
    Ok(())
}

/// A single line of the cart being checked out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CartItem {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: u32,
    /// Unit price
    #[validate(custom = "validate_item_price")]
    pub price: Decimal,
    pub category: Option<String>,
    pub store_id: Option<Uuid>,
}

/// Snapshot of a checkout attempt
///
/// Built fresh for every validation call and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponContext {
    /// Pre-discount amount the discount is computed against
    #[serde(alias = "cart_total")]
    pub order_total: Decimal,
    #[serde(default)]
    pub items: Vec<CartItem>,
    pub store_id: Option<Uuid>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub product_ids: Vec<Uuid>,
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub is_first_purchase: bool,
}

impl CouponContext {
    /// Context carrying only an order total
    pub fn with_total(order_total: Decimal) -> Self {
        Self {
            order_total,
            items: Vec::new(),
            store_id: None,
            categories: Vec::new(),
            product_ids: Vec::new(),
            user_id: None,
            is_first_purchase: false,
        }
    }

    /// Derive a context from cart lines
    ///
    /// The total is the sum of `price * quantity`. Categories and product ids keep
    /// first-seen order. The store is set only when every line names the same store.
    pub fn from_items(items: Vec<CartItem>) -> CouponResult<Self> {
        let order_total = items
            .iter()
            .try_fold(Decimal::ZERO, |total, item| {
                item.price
                    .checked_mul(Decimal::from(item.quantity))
                    .and_then(|line| total.checked_add(line))
            })
            .ok_or_else(|| CouponError::ValidationError("cart total is too large".to_string()))?;

        let mut categories: Vec<String> = Vec::new();
        let mut product_ids: Vec<Uuid> = Vec::new();
        for item in &items {
            if let Some(ref category) = item.category {
                if !categories.contains(category) {
                    categories.push(category.clone());
                }
            }
            if !product_ids.contains(&item.product_id) {
                product_ids.push(item.product_id);
            }
        }

        let first_store = items.first().and_then(|item| item.store_id);
        let store_id = first_store.filter(|store| {
            items.iter().all(|item| item.store_id == Some(*store))
        });

        Ok(Self {
            order_total,
            items,
            store_id,
            categories,
            product_ids,
            user_id: None,
            is_first_purchase: false,
        })
    }

    pub fn for_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn in_store(mut self, store_id: Uuid) -> Self {
        self.store_id = Some(store_id);
        self
    }

    pub fn first_purchase(mut self, is_first_purchase: bool) -> Self {
        self.is_first_purchase = is_first_purchase;
        self
    }
}

/// One failed rule in a validation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: CouponErrorCode,
    pub message: String,
    /// Name of the rule that produced the issue
    pub rule: String,
}

impl ValidationIssue {
    pub fn new(code: CouponErrorCode, message: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            rule: rule.into(),
        }
    }
}

/// Outcome of validating a coupon against a context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponValidation {
    pub is_valid: bool,
    /// Every failing rule, in chain order
    pub errors: Vec<ValidationIssue>,
    pub discount_amount: Decimal,
    pub final_total: Decimal,
    /// Names of every rule that was evaluated
    pub rules_evaluated: Vec<String>,
}

impl CouponValidation {
    /// Rejected result with the discount left at its defaults
    pub fn rejected(order_total: Decimal, errors: Vec<ValidationIssue>, rules_evaluated: Vec<String>) -> Self {
        Self {
            is_valid: false,
            errors,
            discount_amount: Decimal::ZERO,
            final_total: order_total,
            rules_evaluated,
        }
    }

    pub fn has_error(&self, code: CouponErrorCode) -> bool {
        self.errors.iter().any(|issue| issue.code == code)
    }

    pub fn error_codes(&self) -> Vec<CouponErrorCode> {
        self.errors.iter().map(|issue| issue.code).collect()
    }

    /// Append a rejection produced outside the rule chain, resetting the amounts
    pub fn reject_with(&mut self, order_total: Decimal, issue: ValidationIssue) {
        self.is_valid = false;
        self.errors.push(issue);
        self.discount_amount = Decimal::ZERO;
        self.final_total = order_total;
    }
}

/// Discount computed for a coupon that already passed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCalculation {
    pub discount_amount: Decimal,
    pub final_total: Decimal,
}

/// Outcome of the per-customer usage check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCheck {
    pub is_valid: bool,
    pub error: Option<ValidationIssue>,
}

impl UsageCheck {
    pub fn allowed() -> Self {
        Self {
            is_valid: true,
            error: None,
        }
    }

    pub fn denied(issue: ValidationIssue) -> Self {
        Self {
            is_valid: false,
            error: Some(issue),
        }
    }
}

/// Append-only fact: one successful redemption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CouponUsageRecord {
    pub id: Uuid,
    pub coupon_id: Uuid,
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub discount_amount: Decimal,
    pub used_at: DateTime<Utc>,
}

/// Successful redemption returned to the checkout flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redemption {
    pub coupon_id: Uuid,
    pub code: String,
    pub order_id: Uuid,
    pub discount_amount: Decimal,
    pub final_total: Decimal,
}

/// Best automatic coupon for a context, with its computed discount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoCouponSuggestion {
    pub coupon: Coupon,
    pub discount_amount: Decimal,
    pub final_total: Decimal,
}

/// Filters applied by the repository when fetching auto-apply candidates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoCouponFilter {
    pub store_id: Option<Uuid>,
    pub now: Option<DateTime<Utc>>,
}

impl AutoCouponFilter {
    pub fn from_context(context: &CouponContext, now: DateTime<Utc>) -> Self {
        Self {
            store_id: context.store_id,
            now: Some(now),
        }
    }
}

/// Request DTO for defining a new coupon
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_new_coupon"))]
pub struct NewCoupon {
    #[validate(
        length(min = 3, max = 50, message = "Coupon code must be 3-50 characters"),
        custom = "validate_coupon_code"
    )]
    pub code: String,
    #[serde(rename = "type")]
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub minimum_order_value: Option<Decimal>,
    pub maximum_discount_amount: Option<Decimal>,
    #[validate(range(min = 1, message = "Usage limit must be at least 1"))]
    pub usage_limit: Option<i32>,
    #[validate(range(min = 1, message = "Per-customer limit must be at least 1"))]
    pub usage_limit_per_customer: Option<i32>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub store_id: Option<Uuid>,
    #[serde(default)]
    pub applicable_categories: Vec<String>,
    #[serde(default)]
    pub applicable_products: Vec<Uuid>,
    #[serde(default)]
    pub applicable_stores: Vec<Uuid>,
    #[serde(default)]
    pub is_auto_apply: bool,
    pub auto_apply_category: Option<String>,
    #[serde(default)]
    pub auto_apply_first_purchase: bool,
}

impl NewCoupon {
    /// Materialize an active coupon with a fresh id and zero uses
    pub fn into_coupon(self) -> Coupon {
        Coupon {
            id: Uuid::new_v4(),
            code: Coupon::normalize_code(&self.code),
            discount_type: self.discount_type,
            value: self.value,
            minimum_order_value: self.minimum_order_value,
            maximum_discount_amount: self.maximum_discount_amount,
            usage_limit: self.usage_limit,
            used_count: 0,
            usage_limit_per_customer: self.usage_limit_per_customer,
            is_active: true,
            start_date: self.start_date,
            end_date: self.end_date,
            store_id: self.store_id,
            applicable_categories: self.applicable_categories,
            applicable_products: self.applicable_products,
            applicable_stores: self.applicable_stores,
            is_auto_apply: self.is_auto_apply,
            auto_apply_category: self.auto_apply_category,
            auto_apply_first_purchase: self.auto_apply_first_purchase,
        }
    }
}

fn validate_new_coupon(coupon: &NewCoupon) -> Result<(), ValidationError> {
    check_definition(
        coupon.discount_type,
        coupon.value,
        coupon.minimum_order_value,
        coupon.maximum_discount_amount,
        coupon.start_date,
        coupon.end_date,
    )
    .map_err(ValidationError::new)
}
