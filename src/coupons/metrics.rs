// Coupon engine metrics
//
// Lock-free counters for validation outcomes, redemptions and repository
// timeouts, plus per-operation timing with slow operation detection.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Operations slower than this are counted and logged
const SLOW_OPERATION_THRESHOLD_MS: u64 = 100;

#[derive(Debug, Default)]
struct OperationStats {
    count: AtomicU64,
    total_time_us: AtomicU64,
    slow: AtomicU64,
}

impl OperationStats {
    fn record(&self, operation: OperationType, duration: Duration) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        if duration.as_millis() as u64 > SLOW_OPERATION_THRESHOLD_MS {
            self.slow.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Slow coupon {}: {}ms", operation.label(), duration.as_millis());
        }
    }

    fn avg_time_ms(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        let total_us = self.total_time_us.load(Ordering::Relaxed);

        if count == 0 {
            0.0
        } else {
            (total_us as f64 / count as f64) / 1000.0
        }
    }

    fn snapshot(&self) -> OperationSummary {
        OperationSummary {
            count: self.count.load(Ordering::Relaxed),
            avg_time_ms: self.avg_time_ms(),
            slow: self.slow.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
struct MetricsInner {
    validations_accepted: AtomicU64,
    validations_rejected: AtomicU64,
    redemptions: AtomicU64,
    redemption_conflicts: AtomicU64,
    auto_apply_hits: AtomicU64,
    auto_apply_misses: AtomicU64,
    repository_timeouts: AtomicU64,

    validation: OperationStats,
    redemption: OperationStats,
    auto_apply: OperationStats,
}

/// Shared, cheaply cloneable metrics handle
#[derive(Debug, Clone, Default)]
pub struct CouponMetrics {
    inner: Arc<MetricsInner>,
}

impl CouponMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_validation(&self, is_valid: bool) {
        let counter = if is_valid {
            &self.inner.validations_accepted
        } else {
            &self.inner.validations_rejected
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_redemption(&self) {
        self.inner.redemptions.fetch_add(1, Ordering::Relaxed);
    }

    /// The atomic usage update lost to a concurrent redemption
    pub fn record_redemption_conflict(&self) {
        self.inner.redemption_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auto_apply(&self, found: bool) {
        let counter = if found {
            &self.inner.auto_apply_hits
        } else {
            &self.inner.auto_apply_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_repository_timeout(&self) {
        self.inner.repository_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Share of validations that were accepted (0.0 to 1.0)
    pub fn acceptance_rate(&self) -> f64 {
        let accepted = self.inner.validations_accepted.load(Ordering::Relaxed);
        let rejected = self.inner.validations_rejected.load(Ordering::Relaxed);
        let total = accepted + rejected;

        if total == 0 {
            0.0
        } else {
            accepted as f64 / total as f64
        }
    }

    pub fn start_validation(&self) -> OperationTimer {
        OperationTimer::new(OperationType::Validation, self.clone())
    }

    pub fn start_redemption(&self) -> OperationTimer {
        OperationTimer::new(OperationType::Redemption, self.clone())
    }

    pub fn start_auto_apply(&self) -> OperationTimer {
        OperationTimer::new(OperationType::AutoApply, self.clone())
    }

    fn stats(&self, operation: OperationType) -> &OperationStats {
        match operation {
            OperationType::Validation => &self.inner.validation,
            OperationType::Redemption => &self.inner.redemption,
            OperationType::AutoApply => &self.inner.auto_apply,
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            validations_accepted: self.inner.validations_accepted.load(Ordering::Relaxed),
            validations_rejected: self.inner.validations_rejected.load(Ordering::Relaxed),
            acceptance_rate: self.acceptance_rate(),
            redemptions: self.inner.redemptions.load(Ordering::Relaxed),
            redemption_conflicts: self.inner.redemption_conflicts.load(Ordering::Relaxed),
            auto_apply_hits: self.inner.auto_apply_hits.load(Ordering::Relaxed),
            auto_apply_misses: self.inner.auto_apply_misses.load(Ordering::Relaxed),
            repository_timeouts: self.inner.repository_timeouts.load(Ordering::Relaxed),
            validation: self.inner.validation.snapshot(),
            redemption: self.inner.redemption.snapshot(),
            auto_apply: self.inner.auto_apply.snapshot(),
        }
    }

    pub fn log_summary(&self) {
        let summary = self.summary();
        tracing::info!(
            "Coupon metrics: {} accepted, {} rejected ({:.1}% accepted), \
             {} redemptions, {} conflicts, {} repository timeouts, \
             validation avg {:.2}ms ({} slow)",
            summary.validations_accepted,
            summary.validations_rejected,
            summary.acceptance_rate * 100.0,
            summary.redemptions,
            summary.redemption_conflicts,
            summary.repository_timeouts,
            summary.validation.avg_time_ms,
            summary.validation.slow,
        );
    }
}

#[derive(Debug, Clone, Copy)]
enum OperationType {
    Validation,
    Redemption,
    AutoApply,
}

impl OperationType {
    fn label(self) -> &'static str {
        match self {
            OperationType::Validation => "validation",
            OperationType::Redemption => "redemption",
            OperationType::AutoApply => "auto-apply lookup",
        }
    }
}

/// Records its elapsed time when dropped
pub struct OperationTimer {
    start: Instant,
    operation: OperationType,
    metrics: CouponMetrics,
}

impl OperationTimer {
    fn new(operation: OperationType, metrics: CouponMetrics) -> Self {
        Self {
            start: Instant::now(),
            operation,
            metrics,
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.metrics.stats(self.operation).record(self.operation, duration);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationSummary {
    pub count: u64,
    pub avg_time_ms: f64,
    pub slow: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub validations_accepted: u64,
    pub validations_rejected: u64,
    pub acceptance_rate: f64,
    pub redemptions: u64,
    pub redemption_conflicts: u64,
    pub auto_apply_hits: u64,
    pub auto_apply_misses: u64,
    pub repository_timeouts: u64,
    pub validation: OperationSummary,
    pub redemption: OperationSummary,
    pub auto_apply: OperationSummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = CouponMetrics::new();
        assert_eq!(metrics.acceptance_rate(), 0.0);
        assert_eq!(metrics.summary().validation.count, 0);
    }

    #[test]
    fn test_validation_counters() {
        let metrics = CouponMetrics::new();
        metrics.record_validation(true);
        metrics.record_validation(true);
        metrics.record_validation(false);

        assert_eq!(metrics.acceptance_rate(), 2.0 / 3.0);
        let summary = metrics.summary();
        assert_eq!(summary.validations_accepted, 2);
        assert_eq!(summary.validations_rejected, 1);
    }

    #[test]
    fn test_timer_records_once() {
        let metrics = CouponMetrics::new();

        {
            let _timer = metrics.start_validation();
            thread::sleep(Duration::from_millis(10));
        }

        let summary = metrics.summary();
        assert_eq!(summary.validation.count, 1);
        assert!(summary.validation.avg_time_ms >= 10.0);
        assert_eq!(summary.redemption.count, 0);
    }

    #[test]
    fn test_slow_operation_detection() {
        let metrics = CouponMetrics::new();

        {
            let _timer = metrics.start_redemption();
            thread::sleep(Duration::from_millis(150));
        }

        assert_eq!(metrics.summary().redemption.slow, 1);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = CouponMetrics::new();
        let handle = metrics.clone();
        handle.record_redemption_conflict();
        handle.record_repository_timeout();

        let summary = metrics.summary();
        assert_eq!(summary.redemption_conflicts, 1);
        assert_eq!(summary.repository_timeouts, 1);
    }
}
