use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};

use common::FileCatalog;
use common::cli::{CommonArgs, utils};
use common::config::Configuration;
use shredder::audit::CoverageAuditor;
use shredder::compiler;
use shredder::registry::{Registry, TargetSelector};

#[derive(Parser)]
#[command(name = "shredder")]
#[command(about = "Shredder - self-serve deletion of user data from the telemetry warehouse")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Command line overrides applied on top of the loaded configuration.
///
/// Only settings the subcommands act on are exposed here; execution settings
/// such as parallelism and dry-run come from the configuration file or
/// `SHREDDER__EXECUTION__*` for embedders running the engine.
#[derive(Args, Debug, Default)]
struct Overrides {
    #[arg(long, global = true, help = "Warehouse project the audited tables belong to")]
    project: Option<String>,

    #[arg(
        long = "target-table",
        global = true,
        help = "Only run entries for this target table (repeatable)"
    )]
    target_tables: Vec<String>,

    #[arg(long, global = true, help = "Run every supported registry entry")]
    all_targets: bool,
}

impl Overrides {
    fn apply(&self, config: &mut Configuration) {
        if let Some(project) = &self.project {
            config.project = project.clone();
        }
        if !self.target_tables.is_empty() {
            config.execution.target_tables = self.target_tables.clone();
        }
        if self.all_targets {
            config.execution.all_targets = true;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the delete statements the selected registry entries compile to
    Plan,
    /// Report identifier columns the registry does not cover
    Audit {
        #[arg(long, help = "Directory of exported schemas, laid out as <dataset>/<table>.json")]
        schema_dir: PathBuf,

        #[arg(long, help = "Output gaps as JSON")]
        json: bool,
    },
    /// Show the effective configuration
    Config {
        #[arg(long, help = "Output configuration in JSON format")]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    utils::init_logging(&cli.common);

    let mut config = utils::load_config(cli.common.config.as_ref())?;
    cli.overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    tracing::debug!("{}", utils::version_info());

    match cli.command {
        Commands::Config { json } => utils::display_config(&config, json),
        Commands::Plan => {
            let registry = load_registry(&config)?;
            plan(&config, &registry)
        }
        Commands::Audit { schema_dir, json } => {
            let registry = load_registry(&config)?;
            audit(&config, &registry, schema_dir, json).await
        }
    }
}

fn load_registry(config: &Configuration) -> Result<Registry> {
    Registry::from_config(Utc::now().date_naive(), &config.audit)
        .context("Failed to build deletion registry")
}

fn plan(config: &Configuration, registry: &Registry) -> Result<()> {
    let items = registry.select(&TargetSelector::from(&config.execution));
    if items.is_empty() {
        tracing::warn!("No registry entries match the selected target tables");
    }

    let mut total = 0;
    for item in &items {
        let statements = compiler::compile_item(item);
        println!(
            "-- {} ({} statements)",
            item.target_table(),
            statements.len()
        );
        for statement in &statements {
            println!("{statement};");
            println!();
        }
        total += statements.len();
    }

    tracing::info!(
        items = items.len(),
        statements = total,
        project = %config.project,
        "Compiled deletion plan"
    );
    Ok(())
}

async fn audit(
    config: &Configuration,
    registry: &Registry,
    schema_dir: PathBuf,
    json: bool,
) -> Result<()> {
    let catalog = FileCatalog::new(schema_dir, config.project.clone());
    let auditor = CoverageAuditor::new(registry, &config.audit.dataset_pattern)
        .context("Failed to create coverage auditor")?;

    let gaps = auditor
        .find_uncovered_identifiers(&catalog)
        .await
        .with_context(|| format!("Failed to audit {}", catalog.root().display()))?;

    if json {
        let json =
            serde_json::to_string_pretty(&gaps).context("Failed to serialize coverage gaps")?;
        println!("{json}");
    } else {
        for gap in &gaps {
            println!("{gap}");
        }
    }
    Ok(())
}
