// In-memory coupon repository
//
// Same conditional semantics as the Postgres adapter: usage recording checks
// both caps and writes under one lock. Used by tests and local runs.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::coupons::error::{CouponError, CouponResult};
use crate::coupons::models::{AutoCouponFilter, Coupon, CouponUsageRecord, NewCoupon};
use crate::coupons::repository::CouponRepository;
use crate::coupons::types::IdentifierKind;

#[derive(Debug, Default)]
struct Store {
    /// Insertion order is the auto-apply candidate order
    coupons: Vec<Coupon>,
    usages: Vec<CouponUsageRecord>,
    customers_with_orders: HashSet<Uuid>,
}

/// Coupon repository held entirely in process memory
#[derive(Clone, Default)]
pub struct InMemoryCouponRepository {
    store: Arc<RwLock<Store>>,
    failures_remaining: Arc<AtomicU32>,
    latency: Option<Duration>,
}

impl InMemoryCouponRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, for exercising timeouts
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next `count` calls fail with a database error
    pub fn fail_next_calls(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Insert a coupon as-is (no validation, code normalized)
    pub async fn insert(&self, mut coupon: Coupon) {
        coupon.code = Coupon::normalize_code(&coupon.code);
        let mut store = self.store.write().await;
        store.coupons.retain(|existing| existing.id != coupon.id);
        store.coupons.push(coupon);
    }

    /// Mark a customer as having a completed order
    pub async fn add_completed_order(&self, user_id: Uuid) {
        self.store.write().await.customers_with_orders.insert(user_id);
    }

    pub async fn usages(&self) -> Vec<CouponUsageRecord> {
        self.store.read().await.usages.clone()
    }

    pub async fn coupon(&self, id: Uuid) -> Option<Coupon> {
        self.store
            .read()
            .await
            .coupons
            .iter()
            .find(|coupon| coupon.id == id)
            .cloned()
    }

    async fn enter(&self) -> CouponResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let injected = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();

        if injected {
            return Err(CouponError::DatabaseError(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl CouponRepository for InMemoryCouponRepository {
    async fn find_coupon_by_identifier(
        &self,
        identifier: &str,
        kind: IdentifierKind,
    ) -> CouponResult<Option<Coupon>> {
        self.enter().await?;
        let store = self.store.read().await;

        let found = match kind {
            IdentifierKind::Code => {
                let code = Coupon::normalize_code(identifier);
                store.coupons.iter().find(|coupon| coupon.code == code)
            }
            IdentifierKind::Id => match Uuid::parse_str(identifier.trim()) {
                Ok(id) => store.coupons.iter().find(|coupon| coupon.id == id),
                Err(_) => None,
            },
        };

        Ok(found.cloned())
    }

    async fn get_user_usage_count(&self, coupon_id: Uuid, user_id: Uuid) -> CouponResult<i64> {
        self.enter().await?;
        let store = self.store.read().await;
        let count = store
            .usages
            .iter()
            .filter(|usage| usage.coupon_id == coupon_id && usage.user_id == user_id)
            .count();
        Ok(count as i64)
    }

    async fn check_is_first_purchase(&self, user_id: Uuid) -> CouponResult<bool> {
        self.enter().await?;
        Ok(!self.store.read().await.customers_with_orders.contains(&user_id))
    }

    async fn record_coupon_usage(
        &self,
        coupon_id: Uuid,
        user_id: Uuid,
        order_id: Uuid,
        discount_amount: Decimal,
    ) -> CouponResult<bool> {
        self.enter().await?;
        let mut store = self.store.write().await;

        let already_redeemed = store
            .usages
            .iter()
            .any(|usage| usage.coupon_id == coupon_id && usage.order_id == order_id);
        let user_count = store
            .usages
            .iter()
            .filter(|usage| usage.coupon_id == coupon_id && usage.user_id == user_id)
            .count() as i64;

        let coupon = match store.coupons.iter_mut().find(|coupon| coupon.id == coupon_id) {
            Some(coupon) => coupon,
            None => return Ok(false),
        };

        if already_redeemed || !coupon.has_remaining_uses() {
            return Ok(false);
        }
        if let Some(limit) = coupon.usage_limit_per_customer.filter(|limit| *limit > 0) {
            if user_count >= i64::from(limit) {
                return Ok(false);
            }
        }

        coupon.used_count += 1;
        store.usages.push(CouponUsageRecord {
            id: Uuid::new_v4(),
            coupon_id,
            user_id,
            order_id,
            discount_amount,
            used_at: Utc::now(),
        });

        Ok(true)
    }

    async fn find_auto_coupons(&self, filter: &AutoCouponFilter) -> CouponResult<Vec<Coupon>> {
        self.enter().await?;
        let now = filter.now.unwrap_or_else(Utc::now);
        let store = self.store.read().await;

        let coupons = store
            .coupons
            .iter()
            .filter(|coupon| coupon.is_auto_apply && coupon.is_active)
            .filter(|coupon| coupon.end_date.map_or(true, |end| end >= now))
            .filter(|coupon| match (coupon.store_id, filter.store_id) {
                (Some(scope), Some(store_id)) => scope == store_id,
                _ => true,
            })
            .cloned()
            .collect();

        Ok(coupons)
    }

    async fn create_coupon(&self, coupon: NewCoupon) -> CouponResult<Coupon> {
        self.enter().await?;
        let coupon = coupon.into_coupon();
        coupon.check_invariants().map_err(CouponError::InvalidCoupon)?;

        let mut store = self.store.write().await;
        if store.coupons.iter().any(|existing| existing.code == coupon.code) {
            return Err(CouponError::ValidationError(format!(
                "Coupon code {} already exists",
                coupon.code
            )));
        }
        store.coupons.push(coupon.clone());

        Ok(coupon)
    }
}
