// Coupon checkout service
//
// Wires the pure engine to a repository: lookup, first-purchase detection,
// validation, per-customer usage and finally the atomic usage write.
// Every repository call is bounded by the configured timeout.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::coupons::auto_apply::AutoApplySelector;
use crate::coupons::error::{CouponError, CouponResult};
use crate::coupons::metrics::CouponMetrics;
use crate::coupons::models::{
    AutoCouponFilter, AutoCouponSuggestion, Coupon, CouponContext, CouponValidation, NewCoupon,
    Redemption,
};
use crate::coupons::repository::CouponRepository;
use crate::coupons::types::IdentifierKind;
use crate::coupons::CouponEngine;

/// Default bound on a single repository call
pub const DEFAULT_REPOSITORY_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CouponServiceConfig {
    pub repository_timeout: Duration,
}

impl Default for CouponServiceConfig {
    fn default() -> Self {
        Self {
            repository_timeout: DEFAULT_REPOSITORY_TIMEOUT,
        }
    }
}

/// A validation run together with the coupon it was run against
struct Evaluation {
    coupon: Option<Coupon>,
    context: CouponContext,
    validation: CouponValidation,
}

#[derive(Clone)]
pub struct CouponService {
    repository: Arc<dyn CouponRepository>,
    engine: CouponEngine,
    metrics: CouponMetrics,
    config: CouponServiceConfig,
}

impl CouponService {
    pub fn new(
        repository: Arc<dyn CouponRepository>,
        metrics: CouponMetrics,
        config: CouponServiceConfig,
    ) -> Self {
        Self {
            repository,
            engine: CouponEngine::new(),
            metrics,
            config,
        }
    }

    pub fn metrics(&self) -> &CouponMetrics {
        &self.metrics
    }

    /// Validate a customer-entered code against a checkout context
    pub async fn validate_code(&self, code: &str, context: CouponContext) -> CouponResult<CouponValidation> {
        let _timer = self.metrics.start_validation();
        let evaluation = self.evaluate(code, context).await?;
        self.metrics.record_validation(evaluation.validation.is_valid);
        Ok(evaluation.validation)
    }

    /// Validate and then record usage exactly once
    ///
    /// Fails with `UsageLimitReached` when the conditional usage update loses
    /// to a concurrent redemption.
    pub async fn redeem(&self, code: &str, context: CouponContext, order_id: Uuid) -> CouponResult<Redemption> {
        let _timer = self.metrics.start_redemption();
        let user_id = context.user_id.ok_or_else(|| {
            CouponError::ValidationError("user_id is required to redeem a coupon".to_string())
        })?;

        let evaluation = self.evaluate(code, context).await?;
        self.metrics.record_validation(evaluation.validation.is_valid);

        let coupon = match evaluation.coupon {
            Some(coupon) => coupon,
            None => return Err(CouponError::NotFound(Coupon::normalize_code(code))),
        };

        if !evaluation.validation.is_valid {
            let codes = evaluation.validation.error_codes();
            tracing::warn!("Redemption of {} rejected: {:?}", coupon.code, codes);
            return Err(CouponError::Rejected(codes));
        }

        let discount_amount = evaluation.validation.discount_amount;
        let recorded = self
            .bounded(self.repository.record_coupon_usage(
                coupon.id,
                user_id,
                order_id,
                discount_amount,
            ))
            .await?;

        if !recorded {
            self.metrics.record_redemption_conflict();
            tracing::warn!("Coupon {} lost a concurrent redemption for order {}", coupon.code, order_id);
            return Err(CouponError::UsageLimitReached(coupon.id));
        }

        self.metrics.record_redemption();
        tracing::info!(
            "Redeemed coupon {} for order {} (discount {}, total {} -> {})",
            coupon.code,
            order_id,
            discount_amount,
            evaluation.context.order_total,
            evaluation.validation.final_total
        );

        Ok(Redemption {
            coupon_id: coupon.id,
            code: coupon.code,
            order_id,
            discount_amount,
            final_total: evaluation.validation.final_total,
        })
    }

    /// Best automatic coupon for the context, if any yields a discount
    ///
    /// Candidates must pass the full rule chain and, for a known customer, the
    /// per-customer cap. A capped-out best candidate falls back to the next one.
    pub async fn suggest_auto_coupon(&self, context: CouponContext) -> CouponResult<Option<AutoCouponSuggestion>> {
        let _timer = self.metrics.start_auto_apply();
        let now = Utc::now();
        let context = self.with_first_purchase(context, true).await;

        let filter = AutoCouponFilter::from_context(&context, now);
        let mut candidates: Vec<Coupon> = self
            .bounded(self.repository.find_auto_coupons(&filter))
            .await?
            .into_iter()
            .filter(|coupon| {
                self.engine
                    .validate_coupon_at(Some(coupon), &context, now)
                    .is_valid
            })
            .collect();

        loop {
            let (coupon, calculation) = match AutoApplySelector::select_best_at(&candidates, &context, now) {
                Some((coupon, calculation)) => (coupon.clone(), calculation),
                None => {
                    self.metrics.record_auto_apply(false);
                    return Ok(None);
                }
            };

            if let Some(user_id) = context.user_id {
                let check = self
                    .engine
                    .validate_user_usage(&coupon, user_id, |coupon_id, user_id| {
                        self.bounded(self.repository.get_user_usage_count(coupon_id, user_id))
                    })
                    .await;
                if !check.is_valid {
                    tracing::debug!("Auto coupon {} exhausted for user {}", coupon.code, user_id);
                    candidates.retain(|candidate| candidate.id != coupon.id);
                    continue;
                }
            }

            self.metrics.record_auto_apply(true);
            return Ok(Some(AutoCouponSuggestion {
                coupon,
                discount_amount: calculation.discount_amount,
                final_total: calculation.final_total,
            }));
        }
    }

    /// Validate and persist a new coupon definition
    pub async fn create_coupon(&self, coupon: NewCoupon) -> CouponResult<Coupon> {
        validator::Validate::validate(&coupon)?;
        self.bounded(self.repository.create_coupon(coupon)).await
    }

    async fn evaluate(&self, code: &str, context: CouponContext) -> CouponResult<Evaluation> {
        let coupon = self
            .bounded(self.repository.find_coupon_by_identifier(code, IdentifierKind::Code))
            .await?;

        let requires_first_purchase = coupon
            .as_ref()
            .map_or(false, |coupon| coupon.auto_apply_first_purchase);
        let context = self.with_first_purchase(context, requires_first_purchase).await;

        let mut validation = self.engine.validate_coupon(coupon.as_ref(), &context);

        if let (Some(coupon), Some(user_id), true) = (coupon.as_ref(), context.user_id, validation.is_valid) {
            let check = self
                .engine
                .validate_user_usage(coupon, user_id, |coupon_id, user_id| {
                    self.bounded(self.repository.get_user_usage_count(coupon_id, user_id))
                })
                .await;
            if let Some(issue) = check.error {
                validation.reject_with(context.order_total, issue);
            }
        }

        if !validation.is_valid {
            tracing::debug!(
                "Coupon {} rejected: {:?}",
                Coupon::normalize_code(code),
                validation.error_codes()
            );
        }

        Ok(Evaluation {
            coupon,
            context,
            validation,
        })
    }

    /// Fill `is_first_purchase` from the repository for a known customer
    ///
    /// A failed lookup leaves the flag false, so first-purchase coupons are refused.
    async fn with_first_purchase(&self, mut context: CouponContext, needed: bool) -> CouponContext {
        let user_id = match context.user_id {
            Some(user_id) if needed => user_id,
            _ => return context,
        };

        context.is_first_purchase = match self
            .bounded(self.repository.check_is_first_purchase(user_id))
            .await
        {
            Ok(is_first) => is_first,
            Err(e) => {
                tracing::warn!("First purchase lookup failed for user {}: {}", user_id, e);
                false
            }
        };
        context
    }

    /// Await a repository call within the configured timeout
    async fn bounded<T, F>(&self, call: F) -> CouponResult<T>
    where
        F: Future<Output = CouponResult<T>>,
    {
        match tokio::time::timeout(self.config.repository_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                self.metrics.record_repository_timeout();
                let timeout_ms = self.config.repository_timeout.as_millis() as u64;
                tracing::warn!("Coupon repository call timed out after {}ms", timeout_ms);
                Err(CouponError::RepositoryTimeout(timeout_ms))
            }
        }
    }
}
