// Rule Chain Validator
//
// Evaluates an ordered list of independent coupon rules and aggregates every
// failure. Rules are plain descriptors (name, error code, predicate, message)
// run by a single loop, so new rules can be appended without touching callers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;

use crate::coupons::models::{Coupon, CouponContext, ValidationIssue};
use crate::coupons::types::CouponErrorCode;

/// Name of the guard rule that runs before all others
pub const COUPON_EXISTS: &str = "coupon_exists";

/// A rule could not be evaluated (malformed data, broken invariant)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFault(pub String);

impl fmt::Display for RuleFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Predicate over a coupon and a checkout context at a point in time
pub type RuleCheck = fn(&Coupon, &CouponContext, DateTime<Utc>) -> Result<bool, RuleFault>;

/// User-facing message for a failed rule
pub type RuleMessage = fn(&Coupon, &CouponContext) -> String;

/// A single named coupon rule
#[derive(Clone)]
pub struct CouponRule {
    pub name: &'static str,
    pub code: CouponErrorCode,
    check: RuleCheck,
    message: RuleMessage,
}

impl CouponRule {
    pub fn new(
        name: &'static str,
        code: CouponErrorCode,
        check: RuleCheck,
        message: RuleMessage,
    ) -> Self {
        Self {
            name,
            code,
            check,
            message,
        }
    }

    /// Evaluate the rule, returning the issue it raises, if any
    ///
    /// A fault is reported as `VALIDATION_ERROR` for this rule only.
    pub fn evaluate(
        &self,
        coupon: &Coupon,
        context: &CouponContext,
        now: DateTime<Utc>,
    ) -> Option<ValidationIssue> {
        match (self.check)(coupon, context, now) {
            Ok(true) => None,
            Ok(false) => Some(ValidationIssue::new(
                self.code,
                (self.message)(coupon, context),
                self.name,
            )),
            Err(fault) => {
                tracing::warn!(
                    "Coupon rule {} faulted for coupon {}: {}",
                    self.name,
                    coupon.code,
                    fault
                );
                Some(ValidationIssue::new(
                    CouponErrorCode::ValidationError,
                    format!("Rule {} could not be evaluated: {}", self.name, fault),
                    self.name,
                ))
            }
        }
    }
}

impl fmt::Debug for CouponRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CouponRule")
            .field("name", &self.name)
            .field("code", &self.code)
            .finish()
    }
}

/// Aggregated result of running a chain
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleOutcome {
    pub errors: Vec<ValidationIssue>,
    pub rules_evaluated: Vec<String>,
}

impl RuleOutcome {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Ordered list of coupon rules
#[derive(Debug, Clone)]
pub struct RuleChain {
    rules: Vec<CouponRule>,
}

impl RuleChain {
    /// Empty chain
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// The full checkout rule set
    pub fn standard() -> Self {
        Self {
            rules: vec![
                coupon_active(),
                not_expired(),
                start_date_valid(),
                usage_limit_not_exceeded(),
                minimum_order_value(),
                store_restriction(),
                category_restriction(),
                product_restriction(),
                store_list_restriction(),
                first_purchase_restriction(),
            ],
        }
    }

    /// Synchronous subset used to pre-filter auto-apply candidates
    pub fn quick() -> Self {
        Self {
            rules: vec![
                coupon_active(),
                not_expired(),
                start_date_valid(),
                usage_limit_not_exceeded(),
                minimum_order_value(),
            ],
        }
    }

    /// Append a rule to the end of the chain
    pub fn with_rule(mut self, rule: CouponRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[CouponRule] {
        &self.rules
    }

    /// Run every rule against the coupon
    ///
    /// No short-circuit: all rules are evaluated top to bottom and every failure
    /// is collected. A missing coupon fails the `coupon_exists` guard and nothing
    /// else can be evaluated.
    pub fn evaluate(
        &self,
        coupon: Option<&Coupon>,
        context: &CouponContext,
        now: DateTime<Utc>,
    ) -> RuleOutcome {
        let mut outcome = RuleOutcome {
            errors: Vec::new(),
            rules_evaluated: vec![COUPON_EXISTS.to_string()],
        };

        let coupon = match coupon {
            Some(coupon) => coupon,
            None => {
                outcome.errors.push(ValidationIssue::new(
                    CouponErrorCode::CouponNotFound,
                    "Coupon not found",
                    COUPON_EXISTS,
                ));
                return outcome;
            }
        };

        for rule in &self.rules {
            outcome.rules_evaluated.push(rule.name.to_string());
            if let Some(issue) = rule.evaluate(coupon, context, now) {
                tracing::debug!(
                    "Coupon {} failed rule {} ({})",
                    coupon.code,
                    rule.name,
                    issue.code
                );
                outcome.errors.push(issue);
            }
        }

        outcome
    }

    /// Whether every rule passes, without building messages for the caller
    pub fn passes(&self, coupon: &Coupon, context: &CouponContext, now: DateTime<Utc>) -> bool {
        self.rules
            .iter()
            .all(|rule| matches!((rule.check)(coupon, context, now), Ok(true)))
    }
}

impl Default for RuleChain {
    fn default() -> Self {
        Self::standard()
    }
}

fn coupon_active() -> CouponRule {
    CouponRule::new(
        "coupon_active",
        CouponErrorCode::CouponInactive,
        |coupon, _, _| Ok(coupon.is_active),
        |_, _| "This coupon is not active".to_string(),
    )
}

fn not_expired() -> CouponRule {
    CouponRule::new(
        "not_expired",
        CouponErrorCode::CouponExpired,
        |coupon, _, now| Ok(coupon.end_date.map_or(true, |end| end >= now)),
        |coupon, _| match coupon.end_date {
            Some(end) => format!("This coupon expired on {}", end.format("%Y-%m-%d")),
            None => "This coupon has expired".to_string(),
        },
    )
}

fn start_date_valid() -> CouponRule {
    CouponRule::new(
        "start_date_valid",
        CouponErrorCode::CouponNotStarted,
        |coupon, _, now| Ok(coupon.start_date <= now),
        |coupon, _| {
            format!(
                "This coupon is not valid until {}",
                coupon.start_date.format("%Y-%m-%d")
            )
        },
    )
}

fn usage_limit_not_exceeded() -> CouponRule {
    CouponRule::new(
        "usage_limit_not_exceeded",
        CouponErrorCode::UsageLimitExceeded,
        |coupon, _, _| {
            if coupon.used_count < 0 {
                return Err(RuleFault(format!("negative used_count {}", coupon.used_count)));
            }
            Ok(coupon.has_remaining_uses())
        },
        |_, _| "This coupon has reached its usage limit".to_string(),
    )
}

fn minimum_order_value() -> CouponRule {
    CouponRule::new(
        "minimum_order_value",
        CouponErrorCode::MinimumOrderValueNotMet,
        |coupon, context, _| match coupon.minimum_order_value {
            None => Ok(true),
            Some(minimum) if minimum < Decimal::ZERO => {
                Err(RuleFault(format!("negative minimum_order_value {}", minimum)))
            }
            Some(minimum) if minimum.is_zero() => Ok(true),
            Some(minimum) => Ok(context.order_total >= minimum),
        },
        |coupon, context| {
            format!(
                "Minimum order value of {:.2} required (order total {:.2})",
                coupon.minimum_order_value.unwrap_or_default(),
                context.order_total
            )
        },
    )
}

fn store_restriction() -> CouponRule {
    CouponRule::new(
        "store_restriction",
        CouponErrorCode::StoreRestriction,
        |coupon, context, _| Ok(coupon.store_id.map_or(true, |store| context.store_id == Some(store))),
        |_, _| "This coupon is only valid for a specific store".to_string(),
    )
}

// Restriction lists fail when the context carries no matching data.
fn category_restriction() -> CouponRule {
    CouponRule::new(
        "category_restriction",
        CouponErrorCode::CategoryRestriction,
        |coupon, context, _| {
            Ok(coupon.applicable_categories.is_empty()
                || context
                    .categories
                    .iter()
                    .any(|category| coupon.applicable_categories.contains(category)))
        },
        |_, _| "This coupon does not apply to the categories in your cart".to_string(),
    )
}

fn product_restriction() -> CouponRule {
    CouponRule::new(
        "product_restriction",
        CouponErrorCode::ProductRestriction,
        |coupon, context, _| {
            Ok(coupon.applicable_products.is_empty()
                || context
                    .product_ids
                    .iter()
                    .any(|product| coupon.applicable_products.contains(product)))
        },
        |_, _| "This coupon does not apply to the products in your cart".to_string(),
    )
}

fn store_list_restriction() -> CouponRule {
    CouponRule::new(
        "store_list_restriction",
        CouponErrorCode::StoreRestriction,
        |coupon, context, _| {
            Ok(coupon.applicable_stores.is_empty()
                || context
                    .store_id
                    .map_or(false, |store| coupon.applicable_stores.contains(&store)))
        },
        |_, _| "This coupon is not valid for this store".to_string(),
    )
}

fn first_purchase_restriction() -> CouponRule {
    CouponRule::new(
        "first_purchase_restriction",
        CouponErrorCode::FirstPurchaseOnly,
        |coupon, context, _| {
            Ok(!coupon.auto_apply_first_purchase
                || (context.is_first_purchase && context.user_id.is_some()))
        },
        |_, _| "This coupon is only available on your first purchase".to_string(),
    )
}
