//! In-memory warehouse implementing both backend traits.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::warehouse::{BackendError, CatalogBackend, ExecutionBackend, SchemaField, TableRef};

/// A statement as seen by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedStatement {
    pub statement: String,
    pub target_table: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug)]
struct FailureRule {
    needle: String,
    error: BackendError,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct State {
    table_sizes: HashMap<String, u64>,
    size_deltas: HashMap<String, i64>,
    submitted: Vec<SubmittedStatement>,
    failures: Vec<FailureRule>,
    datasets: BTreeMap<String, BTreeMap<String, Vec<SchemaField>>>,
}

/// Fake warehouse for engine and audit tests.
///
/// Real statements apply a per-table size delta instead of evaluating SQL, so
/// tests can script exactly how much a delete shrinks (or grows) a table.
#[derive(Debug)]
pub struct InMemoryWarehouse {
    project: String,
    dry_run_cost: u64,
    scan_cost: u64,
    latency: Duration,
    state: Mutex<State>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    size_lookups: AtomicUsize,
}

impl Default for InMemoryWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self {
            project: "test-project".to_string(),
            dry_run_cost: 0,
            scan_cost: 0,
            latency: Duration::ZERO,
            state: Mutex::new(State::default()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            size_lookups: AtomicUsize::new(0),
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Register a table with its current size.
    pub fn with_table(self, table: impl Into<String>, size_bytes: u64) -> Self {
        self.lock().table_sizes.insert(table.into(), size_bytes);
        self
    }

    /// Change applied to `table`'s size by each real statement targeting it.
    pub fn with_statement_size_delta(self, table: impl Into<String>, delta: i64) -> Self {
        self.lock().size_deltas.insert(table.into(), delta);
        self
    }

    /// Bytes reported for every dry-run submission.
    pub fn with_dry_run_cost(mut self, bytes: u64) -> Self {
        self.dry_run_cost = bytes;
        self
    }

    /// Bytes reported for every real submission.
    pub fn with_scan_cost(mut self, bytes: u64) -> Self {
        self.scan_cost = bytes;
        self
    }

    /// Time every submission spends "running", to make overlap observable.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every submission whose text contains `needle`.
    pub fn failing_statements(self, needle: impl Into<String>, error: BackendError) -> Self {
        self.push_failure(needle.into(), error, None)
    }

    /// Fail the first `times` submissions whose text contains `needle`.
    pub fn failing_statements_times(
        self,
        needle: impl Into<String>,
        error: BackendError,
        times: usize,
    ) -> Self {
        self.push_failure(needle.into(), error, Some(times))
    }

    /// Add a table to the catalog side.
    pub fn with_schema(
        self,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
        fields: Vec<SchemaField>,
    ) -> Self {
        self.lock()
            .datasets
            .entry(dataset_id.into())
            .or_default()
            .insert(table_id.into(), fields);
        self
    }

    pub fn submitted(&self) -> Vec<SubmittedStatement> {
        self.lock().submitted.clone()
    }

    pub fn table_size(&self, table: &str) -> Option<u64> {
        self.lock().table_sizes.get(table).copied()
    }

    /// Number of `table_size_bytes` calls served.
    pub fn size_lookups(&self) -> usize {
        self.size_lookups.load(Ordering::SeqCst)
    }

    /// Highest number of submissions that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn push_failure(self, needle: String, error: BackendError, remaining: Option<usize>) -> Self {
        self.lock().failures.push(FailureRule {
            needle,
            error,
            remaining,
        });
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("warehouse state poisoned")
    }

    fn target_table(statement: &str) -> Option<String> {
        let start = statement.find('`')? + 1;
        let len = statement[start..].find('`')?;
        Some(statement[start..start + len].to_string())
    }
}

#[async_trait]
impl ExecutionBackend for InMemoryWarehouse {
    async fn submit(&self, statement: &str, dry_run: bool) -> Result<u64, BackendError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(&self.in_flight);
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let target_table = Self::target_table(statement);
        let mut state = self.lock();

        if let Some(rule) = state
            .failures
            .iter_mut()
            .find(|rule| statement.contains(&rule.needle) && rule.remaining != Some(0))
        {
            if let Some(remaining) = rule.remaining.as_mut() {
                *remaining -= 1;
            }
            return Err(rule.error.clone());
        }

        state.submitted.push(SubmittedStatement {
            statement: statement.to_string(),
            target_table: target_table.clone(),
            dry_run,
        });

        if dry_run {
            return Ok(self.dry_run_cost);
        }

        if let Some(table) = target_table {
            let delta = state.size_deltas.get(&table).copied().unwrap_or(0);
            if let Some(size) = state.table_sizes.get_mut(&table) {
                *size = size.saturating_add_signed(delta);
            }
        }

        Ok(self.scan_cost)
    }

    async fn table_size_bytes(&self, table: &str) -> Result<u64, BackendError> {
        self.size_lookups.fetch_add(1, Ordering::SeqCst);
        self.lock()
            .table_sizes
            .get(table)
            .copied()
            .ok_or_else(|| BackendError::TableNotFound(table.to_string()))
    }
}

#[async_trait]
impl CatalogBackend for InMemoryWarehouse {
    async fn list_datasets(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.lock().datasets.keys().cloned().collect())
    }

    async fn list_tables(&self, dataset_id: &str) -> Result<Vec<TableRef>, BackendError> {
        let state = self.lock();
        let tables = state
            .datasets
            .get(dataset_id)
            .ok_or_else(|| BackendError::Catalog(format!("dataset not found: {dataset_id}")))?;
        Ok(tables
            .keys()
            .map(|table_id| TableRef::new(&self.project, dataset_id, table_id))
            .collect())
    }

    async fn get_schema(&self, table: &TableRef) -> Result<Vec<SchemaField>, BackendError> {
        self.lock()
            .datasets
            .get(&table.dataset_id)
            .and_then(|tables| tables.get(&table.table_id))
            .cloned()
            .ok_or_else(|| BackendError::TableNotFound(table.full_table_id()))
    }
}
