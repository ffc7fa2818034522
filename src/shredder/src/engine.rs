//! Deletion engine
//!
//! Compiles the selected registry entries and runs the resulting statements
//! through one shared [`WorkerPool`]. Under dry-run every statement only
//! reports its estimated scan cost; otherwise the target table is measured
//! before and after its statements run and the difference is reported as
//! bytes deleted.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use common::config::ExecutionConfig;
use common::{BackendError, ExecutionBackend};

use crate::compiler;
use crate::error::EngineError;
use crate::metrics::ShredderMetrics;
use crate::pool::WorkerPool;
use crate::registry::DeleteItem;

/// Upper bound for a single backoff sleep.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// `base_delay * 2^(attempt-1)`, capped at [`MAX_RETRY_DELAY`].
fn backoff_delay(base_delay: Duration, attempt: u32) -> Duration {
    let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
    base_delay.saturating_mul(factor).min(MAX_RETRY_DELAY)
}

/// Signed size reduction, saturating at the `i64` range.
fn size_reduction(pre_size: u64, post_size: u64) -> i64 {
    let delta = i128::from(pre_size) - i128::from(post_size);
    i64::try_from(delta).unwrap_or(if delta < 0 { i64::MIN } else { i64::MAX })
}

/// Settings for a single deletion run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub parallelism: usize,
    pub dry_run: bool,
    pub verbose: bool,
    /// Attempts per backend call, counting the first one
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&ExecutionConfig::default())
    }
}

impl From<&ExecutionConfig> for EngineConfig {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            parallelism: config.parallelism,
            dry_run: config.dry_run,
            verbose: config.verbose,
            max_retries: config.max_retries,
            base_delay: config.base_delay,
        }
    }
}

/// Outcome for one registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemResult {
    pub target_table: String,
    /// Statements compiled and run for the entry
    pub statements: usize,
    /// Bytes scanned, or the estimate under dry-run
    pub bytes_processed: u64,
    /// `pre_size - post_size`; `None` under dry-run
    pub bytes_deleted: Option<i64>,
}

/// Summary of a finished deletion run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub items: Vec<ItemResult>,
    pub statements: usize,
    pub total_bytes_processed: u64,
    /// Sum of per-item deletions; zero under dry-run
    pub total_bytes_deleted: i64,
}

pub struct DeletionEngine {
    backend: Arc<dyn ExecutionBackend>,
    pool: WorkerPool,
    config: EngineConfig,
    metrics: ShredderMetrics,
}

impl DeletionEngine {
    pub fn new(
        backend: Arc<dyn ExecutionBackend>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let size =
            NonZeroUsize::new(config.parallelism).ok_or(EngineError::InvalidParallelism)?;
        Ok(Self::with_pool(backend, WorkerPool::new(size), config))
    }

    /// Engine drawing slots from an existing pool, so several engines can
    /// share one concurrency limit.
    pub fn with_pool(
        backend: Arc<dyn ExecutionBackend>,
        pool: WorkerPool,
        config: EngineConfig,
    ) -> Self {
        Self {
            backend,
            pool,
            config,
            metrics: ShredderMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &ShredderMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run every statement of `items`. The first permanent failure aborts
    /// the whole run and no report is produced.
    pub async fn run(&self, items: &[DeleteItem]) -> Result<RunReport, EngineError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        info!(
            run_id = %run_id,
            items = items.len(),
            parallelism = self.pool.size(),
            dry_run = self.config.dry_run,
            "Starting deletion run"
        );

        let results = try_join_all(items.iter().map(|item| self.handle_item(item))).await?;

        let statements: usize = results.iter().map(|r| r.statements).sum();
        let total_bytes_processed: u64 = results.iter().map(|r| r.bytes_processed).sum();
        let total_bytes_deleted: i64 = results.iter().filter_map(|r| r.bytes_deleted).sum();

        if self.config.dry_run {
            info!("Would scan {} in total", total_bytes_processed);
        } else {
            info!(
                "Scanned {} and deleted {} in total",
                total_bytes_processed, total_bytes_deleted
            );
        }
        self.metrics.summary().log();

        Ok(RunReport {
            run_id,
            dry_run: self.config.dry_run,
            started_at,
            completed_at: Utc::now(),
            items: results,
            statements,
            total_bytes_processed,
            total_bytes_deleted,
        })
    }

    async fn handle_item(&self, item: &DeleteItem) -> Result<ItemResult, EngineError> {
        let table = item.target_table();
        let statements = compiler::compile_item(item);

        let pre_size = if self.config.dry_run {
            None
        } else {
            Some(self.table_size(table).await?)
        };

        let processed =
            try_join_all(statements.iter().map(|statement| self.submit(table, statement))).await?;
        let bytes_processed: u64 = processed.iter().sum();

        let bytes_deleted = match pre_size {
            Some(pre) => {
                let post = self.table_size(table).await?;
                Some(size_reduction(pre, post))
            }
            None => None,
        };

        match bytes_deleted {
            Some(deleted) => info!(
                table = %table,
                "Scanned {} bytes and deleted {} from {}",
                bytes_processed, deleted, table
            ),
            None => info!(table = %table, "Would scan {} bytes from {}", bytes_processed, table),
        }
        self.metrics.record_item_completed(bytes_deleted);

        Ok(ItemResult {
            target_table: table.to_string(),
            statements: statements.len(),
            bytes_processed,
            bytes_deleted,
        })
    }

    async fn submit(&self, table: &str, statement: &str) -> Result<u64, EngineError> {
        let dry_run = self.config.dry_run;
        let result = self
            .with_retry(table, || async move {
                if self.config.verbose {
                    if dry_run {
                        info!("Would run query: {}", statement);
                    } else {
                        info!("Running query: {}", statement);
                    }
                }
                self.metrics.record_statement_submitted();
                self.backend.submit(statement, dry_run).await
            })
            .await;

        match result {
            Ok(bytes) => {
                self.metrics.record_bytes_processed(bytes);
                Ok(bytes)
            }
            Err(e) => {
                self.metrics.record_statement_failed();
                Err(e)
            }
        }
    }

    async fn table_size(&self, table: &str) -> Result<u64, EngineError> {
        self.with_retry(table, || self.backend.table_size_bytes(table)).await
    }

    /// Call `op` in a pool slot, retrying transient failures with exponential
    /// backoff. The slot is released while waiting between attempts.
    async fn with_retry<T, F, Fut>(&self, table: &str, mut op: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let max_attempts = self.config.max_retries.max(1);
        let mut attempt = 1;

        loop {
            debug!(table = %table, attempt, max_attempts, "Calling backend");

            let error = match self.pool.run(op()).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(table = %table, attempt, "Backend call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_transient() {
                return Err(EngineError::Backend {
                    table: table.to_string(),
                    source: error,
                });
            }

            if attempt >= max_attempts {
                warn!(
                    table = %table,
                    attempts = attempt,
                    error = %error,
                    "Giving up after transient failures"
                );
                return Err(EngineError::RetriesExhausted {
                    table: table.to_string(),
                    attempts: attempt,
                    source: error,
                });
            }

            let delay = backoff_delay(self.config.base_delay, attempt);
            warn!(
                table = %table,
                attempt,
                max_attempts,
                error = %error,
                "Transient failure, retrying after {:?}",
                delay
            );
            self.metrics.record_retry();
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
