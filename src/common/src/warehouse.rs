//! Narrow interfaces to the data warehouse.
//!
//! The deletion engine only ever submits statements and asks for table sizes;
//! the coverage audit only ever lists datasets, tables and schemas. Concrete
//! clients live outside this workspace and implement these traits.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a warehouse backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Rate limiting, network hiccups, backend unavailable. Safe to retry.
    #[error("transient backend failure: {0}")]
    Transient(String),

    /// The statement was rejected or failed while running.
    #[error("query failed: {0}")]
    Query(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("catalog error: {0}")]
    Catalog(String),
}

impl BackendError {
    /// Whether the operation may succeed if issued again unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }
}

/// Executes statements against the warehouse.
///
/// Implementations must accept concurrent, independent submissions.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Run `statement` and return the number of bytes it processed.
    ///
    /// With `dry_run` set the backend only estimates the cost and must not
    /// change any table.
    async fn submit(&self, statement: &str, dry_run: bool) -> Result<u64, BackendError>;

    /// Current size of `table` (`dataset.table`) in bytes.
    async fn table_size_bytes(&self, table: &str) -> Result<u64, BackendError>;
}

/// Reads table metadata from the warehouse.
#[async_trait]
pub trait CatalogBackend: Send + Sync {
    async fn list_datasets(&self) -> Result<Vec<String>, BackendError>;

    async fn list_tables(&self, dataset_id: &str) -> Result<Vec<TableRef>, BackendError>;

    async fn get_schema(&self, table: &TableRef) -> Result<Vec<SchemaField>, BackendError>;
}

/// Fully qualified reference to a warehouse table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub project: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableRef {
    pub fn new(
        project: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }

    /// `dataset.table`, the form used by deletion registry entries.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.dataset_id, self.table_id)
    }

    /// `project.dataset.table`
    pub fn full_table_id(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset_id, self.table_id)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_table_id())
    }
}

/// Column mode as exported by the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    Required,
    #[default]
    Nullable,
    Repeated,
}

/// One node of a table schema, matching the warehouse JSON export
/// (`{"name", "type", "mode", "fields"}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub mode: FieldMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<SchemaField>,
}

impl SchemaField {
    pub fn leaf(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            mode: FieldMode::Nullable,
            fields: Vec::new(),
        }
    }

    pub fn record(name: impl Into<String>, mode: FieldMode, fields: Vec<SchemaField>) -> Self {
        Self {
            name: name.into(),
            field_type: "RECORD".to_string(),
            mode,
            fields,
        }
    }

    /// Nested fields are exported as either `RECORD` or `STRUCT`.
    pub fn is_record(&self) -> bool {
        self.field_type.eq_ignore_ascii_case("RECORD")
            || self.field_type.eq_ignore_ascii_case("STRUCT")
    }

    pub fn is_repeated(&self) -> bool {
        self.mode == FieldMode::Repeated
    }
}
