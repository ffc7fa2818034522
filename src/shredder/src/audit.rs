//! Coverage audit
//!
//! Walks the warehouse catalog looking for identifier-like columns in tables
//! the registry knows nothing about. The output is a list of candidates for a
//! human to either add to the registry or acknowledge as unsupported.

use std::fmt;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use common::config::DEFAULT_DATASET_PATTERN;
use common::{CatalogBackend, SchemaField};

use crate::error::AuditError;
use crate::registry::{IdentifierPattern, Registry};

/// An identifier column with no registry entry covering it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageGap {
    /// `dataset.table`
    pub table: String,
    /// Dotted field path, `[]` marking repeated records
    pub field: String,
}

impl fmt::Display for CoverageGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target_table='{}', target_id='{}'", self.table, self.field)
    }
}

/// Fully qualified names of the identifier-like leaf fields in `fields`, in
/// schema order.
pub fn find_ids(fields: &[SchemaField], pattern: &IdentifierPattern) -> Vec<String> {
    let mut ids = Vec::new();
    collect_ids(fields, "", pattern, &mut ids);
    ids
}

fn collect_ids(
    fields: &[SchemaField],
    prefix: &str,
    pattern: &IdentifierPattern,
    ids: &mut Vec<String>,
) {
    for field in fields {
        if field.is_record() {
            let repeated = if field.is_repeated() { "[]" } else { "" };
            let child_prefix = format!("{prefix}{}{repeated}.", field.name);
            collect_ids(&field.fields, &child_prefix, pattern, ids);
        } else {
            let name = format!("{prefix}{}", field.name);
            if pattern.is_identifier(&name) {
                ids.push(name);
            }
        }
    }
}

pub struct CoverageAuditor<'a> {
    registry: &'a Registry,
    dataset_pattern: Regex,
}

impl<'a> CoverageAuditor<'a> {
    pub fn new(registry: &'a Registry, dataset_pattern: &str) -> Result<Self, AuditError> {
        let dataset_pattern =
            Regex::new(dataset_pattern).map_err(|source| AuditError::InvalidDatasetPattern {
                pattern: dataset_pattern.to_string(),
                source,
            })?;
        Ok(Self {
            registry,
            dataset_pattern,
        })
    }

    pub fn dataset_pattern(&self) -> &str {
        self.dataset_pattern.as_str()
    }

    /// Identifier columns of matching datasets not covered by any supported or
    /// unsupported registry entry. Tables are reported in catalog order; the
    /// fields of one table are ordered by identifier priority.
    pub async fn find_uncovered_identifiers(
        &self,
        catalog: &dyn CatalogBackend,
    ) -> Result<Vec<CoverageGap>, AuditError> {
        let supported = self.registry.supported_tables();
        let known = self.registry.known_coverage();
        let mut gaps = Vec::new();

        for dataset in catalog.list_datasets().await? {
            if !self.dataset_pattern.is_match(&dataset) {
                debug!(dataset = %dataset, "Skipping dataset");
                continue;
            }

            for table_ref in catalog.list_tables(&dataset).await? {
                let table = table_ref.qualified_name();
                if supported.contains(table.as_str()) {
                    debug!(table = %table, "Skipping table covered by registry");
                    continue;
                }

                let schema = catalog.get_schema(&table_ref).await?;
                let mut ids = find_ids(&schema, self.registry.id_pattern());
                if ids.is_empty() {
                    continue;
                }
                self.registry.id_priority().sort(&mut ids);

                gaps.extend(
                    ids.into_iter()
                        .filter(|field| !known.contains(&table, field))
                        .map(|field| CoverageGap {
                            table: table.clone(),
                            field,
                        }),
                );
            }
        }

        info!(gaps = gaps.len(), "Coverage audit complete");
        Ok(gaps)
    }
}

/// Audit `catalog` with the default dataset naming convention.
pub async fn find_uncovered_identifiers(
    catalog: &dyn CatalogBackend,
    registry: &Registry,
) -> Result<Vec<CoverageGap>, AuditError> {
    CoverageAuditor::new(registry, DEFAULT_DATASET_PATTERN)?
        .find_uncovered_identifiers(catalog)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use common::FieldMode;
    use common::testing::InMemoryWarehouse;

    use crate::registry::{DeleteItem, IdPriority};

    fn leaf(name: &str) -> SchemaField {
        SchemaField::leaf(name, "STRING")
    }

    fn registry(items: Vec<DeleteItem>, unsupported: Vec<DeleteItem>) -> Registry {
        Registry::new(
            items,
            unsupported,
            IdPriority::default(),
            IdentifierPattern::standard().unwrap(),
        )
    }

    fn entry(target_table: &str, target_id: &str) -> DeleteItem {
        DeleteItem::new(
            "telemetry_stable.deletion_request_v4",
            "client_id",
            "TRUE",
            target_table,
            target_id,
            ["TRUE"],
        )
        .unwrap()
    }

    #[test]
    fn test_find_ids_flat() {
        let pattern = IdentifierPattern::standard().unwrap();
        let fields = vec![leaf("user_id"), leaf("session_id"), leaf("name")];
        assert_eq!(find_ids(&fields, &pattern), vec!["user_id"]);
    }

    #[test]
    fn test_find_ids_nested_prefixes_do_not_leak() {
        let pattern = IdentifierPattern::standard().unwrap();
        let fields = vec![
            SchemaField::record("client_info", FieldMode::Nullable, vec![leaf("client_id")]),
            SchemaField::record("events", FieldMode::Repeated, vec![leaf("profile_id")]),
            leaf("user_id"),
        ];

        assert_eq!(
            find_ids(&fields, &pattern),
            vec!["client_info.client_id", "events[].profile_id", "user_id"]
        );
    }

    #[test]
    fn test_find_ids_applies_denylist_to_full_path() {
        let pattern = IdentifierPattern::standard().unwrap();
        let fields = vec![
            SchemaField::record("tiles", FieldMode::Repeated, vec![leaf("id")]),
            SchemaField::record("payload", FieldMode::Nullable, vec![leaf("id")]),
        ];
        assert_eq!(find_ids(&fields, &pattern), vec!["payload.id"]);
    }

    #[tokio::test]
    async fn test_reports_user_id_only() {
        let warehouse = InMemoryWarehouse::new().with_schema(
            "foo_stable",
            "bar_v1",
            vec![leaf("user_id"), leaf("session_id")],
        );
        let registry = registry(vec![], vec![]);

        let gaps = find_uncovered_identifiers(&warehouse, &registry).await.unwrap();

        assert_eq!(
            gaps,
            vec![CoverageGap {
                table: "foo_stable.bar_v1".to_string(),
                field: "user_id".to_string(),
            }]
        );
        assert_eq!(
            gaps[0].to_string(),
            "target_table='foo_stable.bar_v1', target_id='user_id'"
        );
    }

    #[tokio::test]
    async fn test_known_pairs_and_supported_tables_are_skipped() {
        let warehouse = InMemoryWarehouse::new()
            .with_schema(
                "foo_stable",
                "known_v1",
                vec![leaf("client_id"), leaf("build_id")],
            )
            .with_schema("foo_stable", "supported_v1", vec![leaf("user_id")]);
        let registry = registry(
            vec![entry("foo_stable.supported_v1", "client_id")],
            vec![entry("foo_stable.known_v1", "client_id")],
        );

        let gaps = find_uncovered_identifiers(&warehouse, &registry).await.unwrap();
        assert!(gaps.is_empty(), "unexpected gaps: {gaps:?}");
    }

    #[tokio::test]
    async fn test_dataset_filter_matches_naming_convention() {
        let warehouse = InMemoryWarehouse::new()
            .with_schema("analysis", "t", vec![leaf("user_id")])
            .with_schema("foo_stable_backup", "t", vec![leaf("user_id")])
            .with_schema("foo_decoded", "t", vec![leaf("user_id")])
            .with_schema("stable", "t", vec![leaf("user_id")]);
        let registry = registry(vec![], vec![]);

        let gaps = find_uncovered_identifiers(&warehouse, &registry).await.unwrap();

        let tables: Vec<_> = gaps.iter().map(|g| g.table.as_str()).collect();
        assert_eq!(tables, vec!["foo_decoded.t", "foo_stable_backup.t"]);
    }

    #[tokio::test]
    async fn test_ranked_fields_come_first() {
        let warehouse = InMemoryWarehouse::new().with_schema(
            "foo_stable",
            "t",
            vec![
                leaf("zeta_id"),
                leaf("user_id"),
                leaf("alpha_id"),
                leaf("client_id"),
            ],
        );
        let registry = registry(vec![], vec![]);

        let gaps = find_uncovered_identifiers(&warehouse, &registry).await.unwrap();

        let fields: Vec<_> = gaps.iter().map(|g| g.field.as_str()).collect();
        assert_eq!(fields, vec!["client_id", "user_id", "zeta_id", "alpha_id"]);
    }

    #[tokio::test]
    async fn test_custom_dataset_pattern() {
        let warehouse = InMemoryWarehouse::new()
            .with_schema("analysis", "t", vec![leaf("user_id")])
            .with_schema("foo_stable", "t", vec![leaf("user_id")]);
        let registry = registry(vec![], vec![]);

        let auditor = CoverageAuditor::new(&registry, "^analysis$").unwrap();
        let gaps = auditor.find_uncovered_identifiers(&warehouse).await.unwrap();

        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].table, "analysis.t");
    }

    #[test]
    fn test_invalid_dataset_pattern() {
        let registry = registry(vec![], vec![]);
        assert!(matches!(
            CoverageAuditor::new(&registry, "(unclosed"),
            Err(AuditError::InvalidDatasetPattern { .. })
        ));
    }

    #[tokio::test]
    async fn test_standard_registry_covers_its_own_tables() {
        let registry = Registry::standard(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()).unwrap();
        let warehouse = InMemoryWarehouse::new()
            .with_schema("telemetry_stable", "main_v4", vec![leaf("client_id")])
            .with_schema(
                "telemetry_stable",
                "sync_v4",
                vec![leaf("id"), leaf("uid")],
            );

        let gaps = find_uncovered_identifiers(&warehouse, &registry).await.unwrap();
        assert!(gaps.is_empty(), "unexpected gaps: {gaps:?}");
    }
}
