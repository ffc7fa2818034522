use common::BackendError;
use thiserror::Error;

/// Errors raised while building or overriding registry data.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Every entry needs at least one target date condition to compile.
    #[error("delete item for '{target_table}' has no target date conditions")]
    EmptyDateConditions { target_table: String },

    #[error("invalid identifier pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors that abort a deletion run.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Permanent backend failure while working on `table`.
    #[error("backend failure for '{table}': {source}")]
    Backend {
        table: String,
        #[source]
        source: BackendError,
    },

    /// A transient failure kept recurring until the retry budget ran out.
    #[error("giving up on '{table}' after {attempts} attempts: {source}")]
    RetriesExhausted {
        table: String,
        attempts: u32,
        #[source]
        source: BackendError,
    },

    #[error("parallelism must be at least 1")]
    InvalidParallelism,
}

/// Errors that abort a coverage audit.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("catalog failure: {0}")]
    Catalog(#[from] BackendError),

    #[error("invalid dataset pattern '{pattern}': {source}")]
    InvalidDatasetPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
