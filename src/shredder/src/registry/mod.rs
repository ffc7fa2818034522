//! Deletion registry: declarative data describing where user data lives.
//!
//! ## Contents
//!
//! - `item`: [`DeleteItem`] mapping records and their copy-with-override API
//! - `identifiers`: identifier priority list and name classification pattern
//! - `standard`: the production set of supported and unsupported entries
//!
//! A [`Registry`] is built once at startup and shared read-only with the
//! deletion engine and the coverage auditor.

pub mod identifiers;
pub mod item;
pub mod standard;

use std::collections::HashSet;

use chrono::NaiveDate;

use common::config::{AuditConfig, ExecutionConfig};

use crate::error::RegistryError;

pub use identifiers::{IdPriority, IdentifierPattern};
pub use item::DeleteItem;

/// Which registry entries a deletion run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelector {
    /// Every supported entry.
    All,
    /// Only entries whose target table is listed.
    Tables(Vec<String>),
}

impl From<&ExecutionConfig> for TargetSelector {
    fn from(config: &ExecutionConfig) -> Self {
        if config.all_targets {
            TargetSelector::All
        } else {
            TargetSelector::Tables(config.target_tables.clone())
        }
    }
}

impl TargetSelector {
    pub fn matches(&self, item: &DeleteItem) -> bool {
        match self {
            TargetSelector::All => true,
            TargetSelector::Tables(tables) => tables.iter().any(|t| t == item.target_table()),
        }
    }
}

/// `(table, identifier field)` pairs already accounted for by the registry.
#[derive(Debug, Clone, Default)]
pub struct KnownCoverage {
    pairs: HashSet<(String, String)>,
}

impl KnownCoverage {
    pub fn contains(&self, table: &str, field: &str) -> bool {
        self.pairs.contains(&(table.to_string(), field.to_string()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<'a> FromIterator<&'a DeleteItem> for KnownCoverage {
    fn from_iter<I: IntoIterator<Item = &'a DeleteItem>>(items: I) -> Self {
        let pairs = items
            .into_iter()
            .flat_map(|item| {
                [
                    (item.target_table().to_string(), item.target_id().to_string()),
                    (item.request_table().to_string(), item.request_id().to_string()),
                ]
            })
            .collect();
        Self { pairs }
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    delete_items: Vec<DeleteItem>,
    unsupported: Vec<DeleteItem>,
    id_priority: IdPriority,
    id_pattern: IdentifierPattern,
}

impl Registry {
    pub fn new(
        delete_items: Vec<DeleteItem>,
        unsupported: Vec<DeleteItem>,
        id_priority: IdPriority,
        id_pattern: IdentifierPattern,
    ) -> Self {
        Self {
            delete_items,
            unsupported,
            id_priority,
            id_pattern,
        }
    }

    /// The production registry. `today` bounds the per-day conditions of the
    /// tables that are deleted from one partition at a time.
    pub fn standard(today: NaiveDate) -> Result<Self, RegistryError> {
        Ok(Self::new(
            standard::supported(today)?,
            standard::unsupported()?,
            IdPriority::default(),
            IdentifierPattern::standard()?,
        ))
    }

    /// Production registry with the audit overrides from configuration applied.
    pub fn from_config(today: NaiveDate, audit: &AuditConfig) -> Result<Self, RegistryError> {
        let registry = Self::standard(today)?;
        match &audit.id_denylist {
            Some(patterns) => Ok(registry.with_id_pattern(IdentifierPattern::new(patterns)?)),
            None => Ok(registry),
        }
    }

    pub fn with_id_pattern(self, id_pattern: IdentifierPattern) -> Self {
        Self { id_pattern, ..self }
    }

    /// Supported entries, the ones the engine runs.
    pub fn delete_items(&self) -> &[DeleteItem] {
        &self.delete_items
    }

    /// Acknowledged entries that are out of scope for deletion.
    pub fn unsupported(&self) -> &[DeleteItem] {
        &self.unsupported
    }

    pub fn id_priority(&self) -> &IdPriority {
        &self.id_priority
    }

    pub fn id_pattern(&self) -> &IdentifierPattern {
        &self.id_pattern
    }

    /// Supported entries chosen by `selector`, in registry order.
    pub fn select(&self, selector: &TargetSelector) -> Vec<DeleteItem> {
        self.delete_items
            .iter()
            .filter(|item| selector.matches(item))
            .cloned()
            .collect()
    }

    /// Target and request tables of the supported entries.
    pub fn supported_tables(&self) -> HashSet<&str> {
        self.delete_items
            .iter()
            .flat_map(|item| [item.target_table(), item.request_table()])
            .collect()
    }

    /// Coverage implied by both supported and unsupported entries.
    pub fn known_coverage(&self) -> KnownCoverage {
        self.delete_items.iter().chain(&self.unsupported).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 15).unwrap()
    }

    #[test]
    fn test_every_entry_has_date_conditions() {
        let registry = Registry::standard(today()).unwrap();
        assert!(!registry.delete_items().is_empty());
        assert!(!registry.unsupported().is_empty());

        for item in registry.delete_items().iter().chain(registry.unsupported()) {
            assert!(
                !item.target_date_conditions().is_empty(),
                "{} has no conditions",
                item.target_table()
            );
        }
    }

    #[test]
    fn test_select_single_table() {
        let registry = Registry::standard(today()).unwrap();
        let selected = registry.select(&TargetSelector::Tables(vec![
            "telemetry_stable.main_v4".to_string(),
        ]));

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].target_table(), "telemetry_stable.main_v4");
    }

    #[test]
    fn test_select_all_and_unknown() {
        let registry = Registry::standard(today()).unwrap();
        assert_eq!(
            registry.select(&TargetSelector::All).len(),
            registry.delete_items().len()
        );
        assert!(
            registry
                .select(&TargetSelector::Tables(vec!["nope.nothing".to_string()]))
                .is_empty()
        );
    }

    #[test]
    fn test_selector_from_execution_config() {
        let mut config = ExecutionConfig::default();
        assert_eq!(
            TargetSelector::from(&config),
            TargetSelector::Tables(vec!["telemetry_stable.main_v4".to_string()])
        );

        config.all_targets = true;
        assert_eq!(TargetSelector::from(&config), TargetSelector::All);
    }

    #[test]
    fn test_unsupported_entries_are_never_selected() {
        let registry = Registry::standard(today()).unwrap();
        let all = registry.select(&TargetSelector::All);
        assert!(
            !all.iter()
                .any(|item| item.target_table() == "telemetry_stable.pioneer_study_v4")
        );
    }

    #[test]
    fn test_known_coverage_includes_both_sides() {
        let registry = Registry::standard(today()).unwrap();
        let coverage = registry.known_coverage();

        assert!(coverage.contains("telemetry_stable.crash_v4", "client_id"));
        assert!(coverage.contains("telemetry_stable.deletion_request_v4", "client_id"));
        // from the unsupported list
        assert!(coverage.contains("telemetry_stable.pioneer_study_v4", "payload.pioneer_id"));
        assert!(coverage.contains("telemetry_stable.sync_v4", "id"));
        assert!(!coverage.contains("telemetry_stable.crash_v4", "user_id"));
    }

    #[test]
    fn test_supported_tables() {
        let registry = Registry::standard(today()).unwrap();
        let tables = registry.supported_tables();
        assert!(tables.contains("telemetry_stable.main_v4"));
        assert!(tables.contains("telemetry_stable.deletion_request_v4"));
        assert!(!tables.contains("telemetry_stable.sync_v4"));
    }

    #[test]
    fn test_denylist_override_from_config() {
        let audit = AuditConfig {
            id_denylist: Some(vec!["user_id".to_string()]),
            ..Default::default()
        };
        let registry = Registry::from_config(today(), &audit).unwrap();
        assert!(!registry.id_pattern().is_identifier("user_id"));
        assert!(registry.id_pattern().is_identifier("build_id"));

        let broken = AuditConfig {
            id_denylist: Some(vec!["((".to_string()]),
            ..Default::default()
        };
        assert!(Registry::from_config(today(), &broken).is_err());
    }
}
