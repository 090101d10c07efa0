// Error types for the coupon engine
// Infrastructure faults only: an invalid coupon is a modeled outcome, not an error

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::coupons::types::CouponErrorCode;

/// Main error type for the coupon engine
///
/// Rule failures never surface here; they are reported as issues inside
/// `CouponValidation`. These variants cover lookups, storage and request faults.
#[derive(Debug, Error)]
pub enum CouponError {
    /// Database operation errors
    /// Automatically converted from sqlx::Error
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// A repository call exceeded the configured timeout
    #[error("Repository call timed out after {0}ms")]
    RepositoryTimeout(u64),

    /// Coupon could not be resolved for an operation that requires one
    #[error("Coupon not found: {0}")]
    NotFound(String),

    /// The atomic usage increment affected no rows
    #[error("Usage limit reached for coupon {0}")]
    UsageLimitReached(Uuid),

    /// Coupon passed lookup but was rejected by validation
    #[error("Coupon rejected: {}", join_codes(.0))]
    Rejected(Vec<CouponErrorCode>),

    /// A stored coupon definition violates its invariants
    #[error("Invalid coupon definition: {0}")]
    InvalidCoupon(String),

    /// Request payload failed validation
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

fn join_codes(codes: &[CouponErrorCode]) -> String {
    codes
        .iter()
        .map(CouponErrorCode::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for coupon operations
pub type CouponResult<T> = Result<T, CouponError>;

impl From<validator::ValidationErrors> for CouponError {
    fn from(err: validator::ValidationErrors) -> Self {
        CouponError::ValidationError(err.to_string())
    }
}

impl IntoResponse for CouponError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            CouponError::DatabaseError(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
            }
            CouponError::RepositoryTimeout(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "Coupon service unavailable")
            }
            CouponError::NotFound(_) => (StatusCode::NOT_FOUND, "Coupon not found"),
            CouponError::UsageLimitReached(_) => {
                (StatusCode::CONFLICT, "Coupon usage limit reached")
            }
            CouponError::Rejected(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "Coupon rejected")
            }
            CouponError::InvalidCoupon(_) => {
                tracing::error!("Invalid coupon definition: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "Invalid coupon definition")
            }
            CouponError::ValidationError(_) => (StatusCode::BAD_REQUEST, "Validation error"),
        };

        // Storage details stay in the logs
        let details = match &self {
            CouponError::DatabaseError(_) | CouponError::InvalidCoupon(_) => None,
            other => Some(other.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
            "details": details,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CouponError::RepositoryTimeout(2000);
        assert_eq!(error.to_string(), "Repository call timed out after 2000ms");

        let error = CouponError::NotFound("SUMMER10".to_string());
        assert_eq!(error.to_string(), "Coupon not found: SUMMER10");
    }

    #[test]
    fn test_error_from_sqlx() {
        let sqlx_error = sqlx::Error::RowNotFound;
        let coupon_error: CouponError = sqlx_error.into();
        assert!(matches!(coupon_error, CouponError::DatabaseError(_)));
    }

    #[test]
    fn test_status_codes() {
        let response = CouponError::UsageLimitReached(Uuid::new_v4()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = CouponError::NotFound("X".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = CouponError::RepositoryTimeout(10).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = CouponError::Rejected(vec![CouponErrorCode::CouponExpired]).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_rejection_lists_codes() {
        let error = CouponError::Rejected(vec![
            CouponErrorCode::CouponInactive,
            CouponErrorCode::MinimumOrderValueNotMet,
        ]);
        assert_eq!(
            error.to_string(),
            "Coupon rejected: COUPON_INACTIVE, MINIMUM_ORDER_VALUE_NOT_MET"
        );
    }
}
