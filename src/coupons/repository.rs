// Coupon repository adapter
//
// The engine only talks to storage through `CouponRepository`. `PgCouponRepository`
// maps rows into `Coupon` at this boundary and performs usage recording as a single
// atomic conditional update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

use crate::coupons::error::{CouponError, CouponResult};
use crate::coupons::models::{AutoCouponFilter, Coupon, NewCoupon};
use crate::coupons::types::{DiscountType, IdentifierKind};

/// Storage contract consumed by the coupon service
#[async_trait]
pub trait CouponRepository: Send + Sync {
    /// Resolve a coupon by code (case-insensitive) or by id
    async fn find_coupon_by_identifier(
        &self,
        identifier: &str,
        kind: IdentifierKind,
    ) -> CouponResult<Option<Coupon>>;

    /// Number of times the user has redeemed the coupon
    async fn get_user_usage_count(&self, coupon_id: Uuid, user_id: Uuid) -> CouponResult<i64>;

    /// True when the user has no completed orders
    async fn check_is_first_purchase(&self, user_id: Uuid) -> CouponResult<bool>;

    /// Append a usage record and increment `used_count` atomically
    ///
    /// Returns `Ok(false)` without writing anything when the global or
    /// per-customer cap is already reached.
    async fn record_coupon_usage(
        &self,
        coupon_id: Uuid,
        user_id: Uuid,
        order_id: Uuid,
        discount_amount: Decimal,
    ) -> CouponResult<bool>;

    /// Active, unexpired auto-apply coupons, scoped to the filter's store
    async fn find_auto_coupons(&self, filter: &AutoCouponFilter) -> CouponResult<Vec<Coupon>>;

    /// Persist a new coupon definition
    async fn create_coupon(&self, coupon: NewCoupon) -> CouponResult<Coupon>;
}

const COUPON_COLUMNS: &str = r#"
    id, code, discount_type, value, minimum_order_value, maximum_discount_amount,
    usage_limit, used_count, usage_limit_per_customer, is_active, start_date, end_date,
    store_id, applicable_categories, applicable_products, applicable_stores,
    is_auto_apply, auto_apply_category, auto_apply_first_purchase
"#;

/// Row shape of the `coupons` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CouponRow {
    pub id: Uuid,
    pub code: String,
    pub discount_type: String,
    pub value: Decimal,
    pub minimum_order_value: Option<Decimal>,
    pub maximum_discount_amount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub usage_limit_per_customer: Option<i32>,
    pub is_active: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub store_id: Option<Uuid>,
    pub applicable_categories: Vec<String>,
    pub applicable_products: Vec<Uuid>,
    pub applicable_stores: Vec<Uuid>,
    pub is_auto_apply: bool,
    pub auto_apply_category: Option<String>,
    pub auto_apply_first_purchase: bool,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = CouponError;

    fn try_from(row: CouponRow) -> Result<Self, Self::Error> {
        let discount_type = DiscountType::from_str(&row.discount_type)
            .map_err(|e| CouponError::InvalidCoupon(format!("coupon {}: {}", row.code, e)))?;

        let coupon = Coupon {
            id: row.id,
            code: row.code,
            discount_type,
            value: row.value,
            minimum_order_value: row.minimum_order_value,
            maximum_discount_amount: row.maximum_discount_amount,
            usage_limit: row.usage_limit,
            used_count: row.used_count,
            usage_limit_per_customer: row.usage_limit_per_customer,
            is_active: row.is_active,
            start_date: row.start_date,
            end_date: row.end_date,
            store_id: row.store_id,
            applicable_categories: row.applicable_categories,
            applicable_products: row.applicable_products,
            applicable_stores: row.applicable_stores,
            is_auto_apply: row.is_auto_apply,
            auto_apply_category: row.auto_apply_category,
            auto_apply_first_purchase: row.auto_apply_first_purchase,
        };

        coupon.check_invariants().map_err(CouponError::InvalidCoupon)?;
        Ok(coupon)
    }
}

/// PostgreSQL-backed coupon repository
#[derive(Clone)]
pub struct PgCouponRepository {
    pool: PgPool,
}

impl PgCouponRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CouponRepository for PgCouponRepository {
    async fn find_coupon_by_identifier(
        &self,
        identifier: &str,
        kind: IdentifierKind,
    ) -> CouponResult<Option<Coupon>> {
        let row = match kind {
            IdentifierKind::Code => {
                let code = Coupon::normalize_code(identifier);
                sqlx::query_as::<_, CouponRow>(&format!(
                    "SELECT {} FROM coupons WHERE code = $1",
                    COUPON_COLUMNS
                ))
                .bind(code)
                .fetch_optional(&self.pool)
                .await?
            }
            IdentifierKind::Id => {
                let id = match Uuid::parse_str(identifier.trim()) {
                    Ok(id) => id,
                    Err(_) => return Ok(None),
                };
                sqlx::query_as::<_, CouponRow>(&format!(
                    "SELECT {} FROM coupons WHERE id = $1",
                    COUPON_COLUMNS
                ))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.map(Coupon::try_from).transpose()
    }

    async fn get_user_usage_count(&self, coupon_id: Uuid, user_id: Uuid) -> CouponResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = $1 AND user_id = $2",
        )
        .bind(coupon_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn check_is_first_purchase(&self, user_id: Uuid) -> CouponResult<bool> {
        let has_orders: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM orders WHERE user_id = $1 AND status = 'completed')",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(!has_orders)
    }

    async fn record_coupon_usage(
        &self,
        coupon_id: Uuid,
        user_id: Uuid,
        order_id: Uuid,
        discount_amount: Decimal,
    ) -> CouponResult<bool> {
        // Dropping the transaction without commit rolls everything back
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent redemptions of the same coupon
        let per_customer: Option<Option<i32>> = sqlx::query_scalar(
            "SELECT usage_limit_per_customer FROM coupons WHERE id = $1 FOR UPDATE",
        )
        .bind(coupon_id)
        .fetch_optional(&mut *tx)
        .await?;

        let per_customer = match per_customer {
            Some(limit) => limit,
            None => return Ok(false),
        };

        if let Some(limit) = per_customer.filter(|limit| *limit > 0) {
            let used: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = $1 AND user_id = $2",
            )
            .bind(coupon_id)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

            if used >= i64::from(limit) {
                tracing::warn!(
                    "Per-customer limit reached for coupon {} and user {}",
                    coupon_id,
                    user_id
                );
                return Ok(false);
            }
        }

        let updated = sqlx::query(
            r#"
            UPDATE coupons
            SET used_count = used_count + 1, updated_at = NOW()
            WHERE id = $1 AND (usage_limit IS NULL OR used_count < usage_limit)
            "#,
        )
        .bind(coupon_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tracing::warn!("Usage limit reached for coupon {}", coupon_id);
            return Ok(false);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO coupon_usages (id, coupon_id, user_id, order_id, discount_amount, used_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(coupon_id)
        .bind(user_id)
        .bind(order_id)
        .bind(discount_amount)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.is_unique_violation() {
                    tracing::warn!("Order {} already redeemed coupon {}", order_id, coupon_id);
                    return Ok(false);
                }
            }
            return Err(e.into());
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn find_auto_coupons(&self, filter: &AutoCouponFilter) -> CouponResult<Vec<Coupon>> {
        let now = filter.now.unwrap_or_else(Utc::now);
        let rows = sqlx::query_as::<_, CouponRow>(&format!(
            r#"
            SELECT {}
            FROM coupons
            WHERE is_auto_apply = TRUE
              AND is_active = TRUE
              AND (end_date IS NULL OR end_date >= $1)
              AND (store_id IS NULL OR $2::uuid IS NULL OR store_id = $2)
            ORDER BY created_at, id
            "#,
            COUPON_COLUMNS
        ))
        .bind(now)
        .bind(filter.store_id)
        .fetch_all(&self.pool)
        .await?;

        // A single malformed definition must not hide every other auto coupon
        let coupons = rows
            .into_iter()
            .filter_map(|row| match Coupon::try_from(row) {
                Ok(coupon) => Some(coupon),
                Err(e) => {
                    tracing::error!("Skipping auto-apply coupon: {}", e);
                    None
                }
            })
            .collect();

        Ok(coupons)
    }

    async fn create_coupon(&self, coupon: NewCoupon) -> CouponResult<Coupon> {
        let coupon = coupon.into_coupon();

        let row = sqlx::query_as::<_, CouponRow>(&format!(
            r#"
            INSERT INTO coupons (
                id, code, discount_type, value, minimum_order_value, maximum_discount_amount,
                usage_limit, used_count, usage_limit_per_customer, is_active, start_date, end_date,
                store_id, applicable_categories, applicable_products, applicable_stores,
                is_auto_apply, auto_apply_category, auto_apply_first_purchase
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING {}
            "#,
            COUPON_COLUMNS
        ))
        .bind(coupon.id)
        .bind(&coupon.code)
        .bind(coupon.discount_type)
        .bind(coupon.value)
        .bind(coupon.minimum_order_value)
        .bind(coupon.maximum_discount_amount)
        .bind(coupon.usage_limit)
        .bind(coupon.used_count)
        .bind(coupon.usage_limit_per_customer)
        .bind(coupon.is_active)
        .bind(coupon.start_date)
        .bind(coupon.end_date)
        .bind(coupon.store_id)
        .bind(&coupon.applicable_categories)
        .bind(&coupon.applicable_products)
        .bind(&coupon.applicable_stores)
        .bind(coupon.is_auto_apply)
        .bind(&coupon.auto_apply_category)
        .bind(coupon.auto_apply_first_purchase)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return CouponError::ValidationError(format!(
                        "Coupon code {} already exists",
                        coupon.code
                    ));
                }
            }
            CouponError::DatabaseError(e)
        })?;

        tracing::info!("Created coupon {} ({})", row.code, row.id);
        Coupon::try_from(row)
    }
}
