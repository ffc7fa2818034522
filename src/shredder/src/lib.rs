//! Self-serve data erasure for the telemetry warehouse.
//!
//! The [`registry`] declares where user data lives and which request table
//! authorizes deleting it. The [`compiler`] turns each entry into delete
//! statements, the [`engine`] runs them against an injected
//! [`ExecutionBackend`](common::ExecutionBackend) through one bounded pool,
//! and the [`audit`] module looks for identifier columns the registry does
//! not cover yet.

use std::sync::Arc;

use common::ExecutionBackend;
use common::config::Configuration;

pub mod audit;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod registry;

pub use audit::{CoverageAuditor, CoverageGap, find_uncovered_identifiers};
pub use engine::{DeletionEngine, EngineConfig, ItemResult, RunReport};
pub use error::{AuditError, EngineError, RegistryError};
pub use registry::{DeleteItem, Registry, TargetSelector};

/// Run the registry entries selected by `config` against `backend`.
pub async fn run_configured(
    config: &Configuration,
    registry: &Registry,
    backend: Arc<dyn ExecutionBackend>,
) -> Result<RunReport, EngineError> {
    let items = registry.select(&TargetSelector::from(&config.execution));
    let engine = DeletionEngine::new(backend, EngineConfig::from(&config.execution))?;
    engine.run(&items).await
}
