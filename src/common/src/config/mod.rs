use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use thiserror::Error;

/// Project that owns the shared production tables.
pub const DEFAULT_PROJECT: &str = "moz-fx-data-shared-prod";

/// Target table the scheduled deletion run is currently limited to.
pub const DEFAULT_TARGET_TABLE: &str = "telemetry_stable.main_v4";

/// Datasets holding materialized ping tables. Anchored at the start only, so
/// suffixed datasets such as `foo_stable_backup` are audited too.
pub const DEFAULT_DATASET_PATTERN: &str = r"^.*_(stable|decoded)";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum number of statements executing concurrently
    ///
    /// Env: SHREDDER__EXECUTION__PARALLELISM
    pub parallelism: usize,
    /// Estimate bytes scanned without deleting anything
    ///
    /// Env: SHREDDER__EXECUTION__DRY_RUN
    #[serde(default)]
    pub dry_run: bool,
    /// Log every compiled statement before it runs
    #[serde(default)]
    pub verbose: bool,
    /// Attempts per statement when the backend reports a transient failure
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each following attempt
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Target tables selected for execution
    ///
    /// Env: SHREDDER__EXECUTION__TARGET_TABLES
    #[serde(default)]
    pub target_tables: Vec<String>,
    /// Ignore `target_tables` and run every supported registry entry
    #[serde(default)]
    pub all_targets: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            dry_run: false,
            verbose: false,
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            target_tables: vec![DEFAULT_TARGET_TABLE.to_string()],
            all_targets: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Regex a dataset name must match to be audited
    pub dataset_pattern: String,
    /// Replaces the built-in list of non-user id patterns when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_denylist: Option<Vec<String>>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            dataset_pattern: DEFAULT_DATASET_PATTERN.to_string(),
            id_denylist: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Configuration {
    /// Warehouse project queries are billed to
    pub project: String,
    /// Deletion run settings
    pub execution: ExecutionConfig,
    /// Coverage audit settings
    pub audit: AuditConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            project: DEFAULT_PROJECT.to_string(),
            execution: ExecutionConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

/// Errors raised by [`Configuration::validate`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("project must not be empty")]
    EmptyProject,

    #[error("execution.parallelism must be at least 1")]
    ZeroParallelism,

    #[error("execution.max_retries must be at least 1")]
    ZeroRetries,

    #[error("execution.target_tables is empty and all_targets is false; nothing would run")]
    NoTargetsSelected,
}

impl Configuration {
    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
    }

    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config = Self::figment()
            .merge(Toml::file("shredder.toml"))
            .merge(Env::prefixed("SHREDDER__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        let config = Self::figment()
            .merge(Toml::file(path))
            .merge(Env::prefixed("SHREDDER__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project.trim().is_empty() {
            return Err(ConfigError::EmptyProject);
        }
        if self.execution.parallelism == 0 {
            return Err(ConfigError::ZeroParallelism);
        }
        if self.execution.max_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        if !self.execution.all_targets && self.execution.target_tables.is_empty() {
            return Err(ConfigError::NoTargetsSelected);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_configuration() {
        let config = Configuration::default();

        assert_eq!(config.project, "moz-fx-data-shared-prod");
        assert_eq!(config.execution.parallelism, 4);
        assert!(!config.execution.dry_run);
        assert_eq!(
            config.execution.target_tables,
            vec!["telemetry_stable.main_v4".to_string()]
        );
        assert!(config.audit.id_denylist.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_configless_extraction() {
        let config = Configuration::figment()
            .extract::<Configuration>()
            .unwrap();

        assert_eq!(config.execution.max_retries, 3);
        assert_eq!(config.execution.base_delay, Duration::from_secs(1));
        assert_eq!(config.audit.dataset_pattern, DEFAULT_DATASET_PATTERN);
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "shredder.toml",
                r#"
                project = "my-project"

                [execution]
                parallelism = 16
                base_delay = "250ms"
                target_tables = ["telemetry_stable.event_v4", "telemetry_stable.crash_v4"]

                [audit]
                id_denylist = ["build_id"]
                "#,
            )?;

            let config = Configuration::load().map_err(|e| e.to_string())?;
            assert_eq!(config.project, "my-project");
            assert_eq!(config.execution.parallelism, 16);
            assert_eq!(config.execution.base_delay, Duration::from_millis(250));
            assert_eq!(config.execution.target_tables.len(), 2);
            assert_eq!(
                config.audit.id_denylist,
                Some(vec!["build_id".to_string()])
            );
            // untouched keys keep their defaults
            assert_eq!(config.execution.max_retries, 3);
            Ok(())
        });
    }

    #[test]
    fn test_env_var_override() {
        Jail::expect_with(|jail| {
            jail.set_env("SHREDDER__PROJECT", "env-project");
            jail.set_env("SHREDDER__EXECUTION__PARALLELISM", "2");
            jail.set_env("SHREDDER__EXECUTION__DRY_RUN", "true");

            let config = Configuration::load().map_err(|e| e.to_string())?;
            assert_eq!(config.project, "env-project");
            assert_eq!(config.execution.parallelism, 2);
            assert!(config.execution.dry_run);
            Ok(())
        });
    }

    #[test]
    fn test_load_from_path() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[execution]\nall_targets = true\n")?;

            let config = Configuration::load_from_path(Path::new("custom.toml"))
                .map_err(|e| e.to_string())?;
            assert!(config.execution.all_targets);
            Ok(())
        });
    }

    #[test]
    fn test_validation_rejects_zero_parallelism() {
        let mut config = Configuration::default();
        config.execution.parallelism = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroParallelism)
        ));
    }

    #[test]
    fn test_validation_rejects_empty_selection() {
        let mut config = Configuration::default();
        config.execution.target_tables.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NoTargetsSelected)
        ));

        config.execution.all_targets = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_retries() {
        let mut config = Configuration::default();
        config.execution.max_retries = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroRetries)));
    }
}
