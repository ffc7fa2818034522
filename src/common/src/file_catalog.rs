//! Catalog backend over exported schema files.
//!
//! Layout: `<root>/<dataset>/<table>.json`, where each file holds the
//! warehouse's schema export. Both the bare field list and the table
//! metadata document (`{"schema": {"fields": [...]}}`) are accepted.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::warehouse::{BackendError, CatalogBackend, SchemaField, TableRef};

#[derive(Deserialize)]
#[serde(untagged)]
enum SchemaDocument {
    Fields(Vec<SchemaField>),
    Schema { fields: Vec<SchemaField> },
    Table { schema: Box<SchemaDocument> },
}

impl SchemaDocument {
    fn into_fields(self) -> Vec<SchemaField> {
        match self {
            SchemaDocument::Fields(fields) | SchemaDocument::Schema { fields } => fields,
            SchemaDocument::Table { schema } => schema.into_fields(),
        }
    }
}

pub struct FileCatalog {
    root: PathBuf,
    project: String,
}

impl FileCatalog {
    pub fn new(root: impl Into<PathBuf>, project: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            project: project.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_path(&self, table: &TableRef) -> PathBuf {
        self.root
            .join(&table.dataset_id)
            .join(format!("{}.json", table.table_id))
    }

    async fn read_dir_sorted(path: &Path) -> Result<Vec<(String, bool)>, BackendError> {
        let mut entries = tokio::fs::read_dir(path)
            .await
            .map_err(|e| BackendError::Catalog(format!("{}: {e}", path.display())))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BackendError::Catalog(format!("{}: {e}", path.display())))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map_err(|e| BackendError::Catalog(format!("{}: {e}", path.display())))?
                .is_dir();
            if let Some(name) = entry.file_name().to_str() {
                names.push((name.to_string(), is_dir));
            }
        }
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl CatalogBackend for FileCatalog {
    async fn list_datasets(&self) -> Result<Vec<String>, BackendError> {
        let entries = Self::read_dir_sorted(&self.root).await?;
        Ok(entries
            .into_iter()
            .filter(|(_, is_dir)| *is_dir)
            .map(|(name, _)| name)
            .collect())
    }

    async fn list_tables(&self, dataset_id: &str) -> Result<Vec<TableRef>, BackendError> {
        let entries = Self::read_dir_sorted(&self.root.join(dataset_id)).await?;
        Ok(entries
            .into_iter()
            .filter(|(_, is_dir)| !*is_dir)
            .filter_map(|(name, _)| {
                name.strip_suffix(".json")
                    .map(|table_id| TableRef::new(&self.project, dataset_id, table_id))
            })
            .collect())
    }

    async fn get_schema(&self, table: &TableRef) -> Result<Vec<SchemaField>, BackendError> {
        let path = self.table_path(table);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackendError::TableNotFound(table.full_table_id()));
            }
            Err(e) => {
                return Err(BackendError::Catalog(format!("{}: {e}", path.display())));
            }
        };

        let document: SchemaDocument = serde_json::from_str(&contents).map_err(|e| {
            BackendError::Catalog(format!("invalid schema in {}: {e}", path.display()))
        })?;

        Ok(document.into_fields())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::FieldMode;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn test_lists_datasets_and_tables_in_order() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "telemetry_stable/main_v4.json", "[]");
        write(dir.path(), "telemetry_stable/crash_v4.json", "[]");
        write(dir.path(), "telemetry_stable/README.md", "ignored");
        write(dir.path(), "analysis/scratch.json", "[]");

        let catalog = FileCatalog::new(dir.path(), "proj");

        let datasets = catalog.list_datasets().await.unwrap();
        assert_eq!(datasets, vec!["analysis", "telemetry_stable"]);

        let tables = catalog.list_tables("telemetry_stable").await.unwrap();
        let names: Vec<String> = tables.iter().map(|t| t.qualified_name()).collect();
        assert_eq!(
            names,
            vec!["telemetry_stable.crash_v4", "telemetry_stable.main_v4"]
        );
        assert_eq!(tables[0].project, "proj");
    }

    #[tokio::test]
    async fn test_reads_both_export_formats() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "a_stable/bare.json",
            r#"[{"name": "client_id", "type": "STRING"}]"#,
        );
        write(
            dir.path(),
            "a_stable/wrapped.json",
            r#"{"tableReference": {}, "schema": {"fields": [
                {"name": "events", "type": "RECORD", "mode": "REPEATED", "fields": [
                    {"name": "id", "type": "STRING"}
                ]}
            ]}}"#,
        );

        let catalog = FileCatalog::new(dir.path(), "proj");

        let bare = catalog
            .get_schema(&TableRef::new("proj", "a_stable", "bare"))
            .await
            .unwrap();
        assert_eq!(bare[0].name, "client_id");

        let wrapped = catalog
            .get_schema(&TableRef::new("proj", "a_stable", "wrapped"))
            .await
            .unwrap();
        assert_eq!(wrapped[0].mode, FieldMode::Repeated);
        assert_eq!(wrapped[0].fields[0].name, "id");
    }

    #[tokio::test]
    async fn test_missing_table_is_reported() {
        let dir = TempDir::new().unwrap();
        let catalog = FileCatalog::new(dir.path(), "proj");

        let err = catalog
            .get_schema(&TableRef::new("proj", "nope", "missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::TableNotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_json_is_a_catalog_error() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a_stable/broken.json", "{not json");
        let catalog = FileCatalog::new(dir.path(), "proj");

        let err = catalog
            .get_schema(&TableRef::new("proj", "a_stable", "broken"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Catalog(_)));
    }
}
