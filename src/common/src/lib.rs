pub mod cli;
pub mod config;
pub mod file_catalog;
pub mod warehouse;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use file_catalog::FileCatalog;
pub use warehouse::{
    BackendError, CatalogBackend, ExecutionBackend, FieldMode, SchemaField, TableRef,
};
