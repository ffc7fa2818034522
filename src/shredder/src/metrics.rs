//! Deletion run metrics
//!
//! Thread-safe counters shared by every worker of a deletion run.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

/// Thread-safe metrics for tracking deletion runs
#[derive(Debug, Clone)]
pub struct ShredderMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// Statements handed to the backend, including retried attempts
    statements_submitted: AtomicUsize,
    /// Statements that failed for good
    statements_failed: AtomicUsize,
    /// Retries after transient backend failures
    retries_attempted: AtomicUsize,
    /// Items whose statements all completed
    items_completed: AtomicUsize,
    /// Bytes scanned (or estimated under dry-run)
    bytes_processed: AtomicU64,
    /// Table size reduction; signed because tables may grow meanwhile
    bytes_deleted: AtomicI64,
}

impl Default for ShredderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ShredderMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                statements_submitted: AtomicUsize::new(0),
                statements_failed: AtomicUsize::new(0),
                retries_attempted: AtomicUsize::new(0),
                items_completed: AtomicUsize::new(0),
                bytes_processed: AtomicU64::new(0),
                bytes_deleted: AtomicI64::new(0),
            }),
        }
    }

    pub fn record_statement_submitted(&self) {
        self.inner
            .statements_submitted
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_statement_failed(&self) {
        self.inner.statements_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.inner.retries_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_processed(&self, bytes: u64) {
        self.inner
            .bytes_processed
            .fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a finished item and the size reduction measured around it
    pub fn record_item_completed(&self, bytes_deleted: Option<i64>) {
        self.inner.items_completed.fetch_add(1, Ordering::Relaxed);
        if let Some(bytes) = bytes_deleted {
            self.inner.bytes_deleted.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    pub fn statements_submitted(&self) -> usize {
        self.inner.statements_submitted.load(Ordering::Relaxed)
    }

    pub fn statements_failed(&self) -> usize {
        self.inner.statements_failed.load(Ordering::Relaxed)
    }

    pub fn retries_attempted(&self) -> usize {
        self.inner.retries_attempted.load(Ordering::Relaxed)
    }

    pub fn items_completed(&self) -> usize {
        self.inner.items_completed.load(Ordering::Relaxed)
    }

    pub fn bytes_processed(&self) -> u64 {
        self.inner.bytes_processed.load(Ordering::Relaxed)
    }

    pub fn bytes_deleted(&self) -> i64 {
        self.inner.bytes_deleted.load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            statements_submitted: self.statements_submitted(),
            statements_failed: self.statements_failed(),
            retries_attempted: self.retries_attempted(),
            items_completed: self.items_completed(),
            bytes_processed: self.bytes_processed(),
            bytes_deleted: self.bytes_deleted(),
        }
    }
}

/// Point-in-time copy of [`ShredderMetrics`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSummary {
    pub statements_submitted: usize,
    pub statements_failed: usize,
    pub retries_attempted: usize,
    pub items_completed: usize,
    pub bytes_processed: u64,
    pub bytes_deleted: i64,
}

impl MetricsSummary {
    pub fn log(&self) {
        tracing::info!("=== Shredder Metrics Summary ===");
        tracing::info!(
            "Statements: {} submitted, {} failed, {} retries",
            self.statements_submitted,
            self.statements_failed,
            self.retries_attempted
        );
        tracing::info!("Items completed: {}", self.items_completed);
        tracing::info!(
            "Bytes: {} processed, {} deleted",
            self.bytes_processed,
            self.bytes_deleted
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = ShredderMetrics::new();
        assert_eq!(metrics.statements_submitted(), 0);
        assert_eq!(metrics.bytes_processed(), 0);
        assert_eq!(metrics.bytes_deleted(), 0);
    }

    #[test]
    fn test_metrics_increment() {
        let metrics = ShredderMetrics::new();

        metrics.record_statement_submitted();
        metrics.record_statement_submitted();
        metrics.record_statement_failed();
        metrics.record_retry();
        metrics.record_bytes_processed(1024);
        metrics.record_item_completed(Some(500));
        metrics.record_item_completed(None);

        let summary = metrics.summary();
        assert_eq!(summary.statements_submitted, 2);
        assert_eq!(summary.statements_failed, 1);
        assert_eq!(summary.retries_attempted, 1);
        assert_eq!(summary.items_completed, 2);
        assert_eq!(summary.bytes_processed, 1024);
        assert_eq!(summary.bytes_deleted, 500);
    }

    #[test]
    fn test_negative_deletion_is_kept() {
        let metrics = ShredderMetrics::new();
        metrics.record_item_completed(Some(-200));
        assert_eq!(metrics.bytes_deleted(), -200);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = ShredderMetrics::new();
        let clone = metrics.clone();
        clone.record_retry();
        assert_eq!(metrics.retries_attempted(), 1);
    }
}
