//! depup CLI
//!
//! Republishes npm packages under a reserved scope with refreshed
//! dependencies and tracks community integrity votes per revision

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use depup::core::config::{BatchConfig, DepupConfig};
use depup::core::{ConfigLoadOptions, ConfigLoader, PackageSpec, RevisionKey, Settings, VoteDirection};
use depup::ledger::{IntegrityLedger, IntegrityReport, RevisionStore};
use depup::orchestration::{
    BatchOptions, BatchOrchestrator, PackagePipeline, PipelineOptions, PipelineServices,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Republish npm packages with refreshed dependencies
#[derive(Parser)]
#[command(name = "depup")]
#[command(version = "0.1.0")]
#[command(about = "Republish npm packages with refreshed dependencies", long_about = None)]
struct Cli {
    /// Verbose logging (overrides RUST_LOG)
    #[arg(long, global = true)]
    debug: bool,

    /// Project directory holding .depup.yaml (defaults to current directory)
    #[arg(long, global = true, value_name = "DIR")]
    project: Option<PathBuf>,

    /// Revision store directory
    #[arg(long, global = true, value_name = "DIR")]
    store_dir: Option<String>,

    /// Reserved scope (e.g. @depup)
    #[arg(long, global = true)]
    scope: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Switches shared by every command that runs the pipeline
#[derive(Args, Clone)]
struct RunFlags {
    /// Bump dependencies to their latest versions
    #[arg(long)]
    bump: bool,

    /// Run install and import checks
    #[arg(long)]
    test: bool,

    /// Publish when the gate allows it
    #[arg(long)]
    publish: bool,

    /// Resolve and plan only, write nothing
    #[arg(long)]
    dry_run: bool,

    /// Whole-run timeout per package, in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Print the reports as JSON
    #[arg(long)]
    json: bool,
}

impl RunFlags {
    fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            bump: self.bump,
            test: self.test,
            publish: self.publish,
            dry_run: self.dry_run,
            timeout: self.timeout.map(Duration::from_secs),
        }
    }
}

#[derive(Args)]
struct BatchFlags {
    /// Items per group
    #[arg(long)]
    concurrency: Option<usize>,

    /// Pause between groups in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce one revision of a package
    Process {
        /// `name` or `name@version`
        spec: String,

        #[command(flatten)]
        run: RunFlags,
    },

    /// Produce revisions for a list of packages
    Batch {
        /// Package specs
        specs: Vec<String>,

        /// File with one spec per line (`#` starts a comment)
        #[arg(short, long)]
        file: Option<PathBuf>,

        #[command(flatten)]
        batch: BatchFlags,

        #[command(flatten)]
        run: RunFlags,
    },

    /// Batch over the `packages` list of the configuration
    Sync {
        #[command(flatten)]
        batch: BatchFlags,

        #[command(flatten)]
        run: RunFlags,
    },

    /// Record a community vote for a revision
    Vote {
        name: String,
        base_version: String,
        index: u64,
        /// up, down or neutral
        direction: String,

        #[arg(short, long)]
        description: Option<String>,

        /// Voter id (defaults to $USER)
        #[arg(long)]
        voter: Option<String>,
    },

    /// Show revisions and integrity of a package
    Integrity {
        name: String,

        /// Print JSON instead of markdown
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let result = run().await;

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error");
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("depup=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("depup=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let project = cli.project.clone().unwrap_or_else(|| PathBuf::from("."));
    let batch_flags = match &cli.command {
        Commands::Batch { batch, .. } | Commands::Sync { batch, .. } => Some(batch),
        _ => None,
    };
    let overrides = cli_overrides(&cli, batch_flags);
    let config = ConfigLoader::load(ConfigLoadOptions::from_process(&project, Some(overrides)))
        .await
        .context("failed to load configuration")?;
    let settings = Settings::from_config(&config);

    match cli.command {
        Commands::Process { spec, run } => process_command(settings, &spec, &run).await,
        Commands::Batch {
            specs, file, run, ..
        } => {
            let mut worklist = specs;
            if let Some(file) = file {
                worklist.extend(read_spec_file(&file).await?);
            }
            batch_command(settings, worklist, &run).await
        }
        Commands::Sync { run, .. } => {
            if settings.packages.is_empty() {
                bail!("no packages configured; add a `packages` list to .depup.yaml");
            }
            let worklist = settings.packages.clone();
            batch_command(settings, worklist, &run).await
        }
        Commands::Vote {
            name,
            base_version,
            index,
            direction,
            description,
            voter,
        } => {
            vote_command(settings, name, base_version, index, &direction, description, voter).await
        }
        Commands::Integrity { name, json } => integrity_command(settings, &name, json).await,
    }
}

/// Global flags as the highest-priority configuration layer
fn cli_overrides(cli: &Cli, batch: Option<&BatchFlags>) -> DepupConfig {
    DepupConfig {
        scope: cli.scope.clone(),
        store_dir: cli.store_dir.clone(),
        batch: batch
            .filter(|b| b.concurrency.is_some() || b.delay_ms.is_some())
            .map(|b| BatchConfig {
                concurrency: b.concurrency,
                delay_ms: b.delay_ms,
            }),
        ..DepupConfig::default()
    }
}

async fn read_spec_file(path: &PathBuf) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(content
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn parse_specs(raw: &[String]) -> Result<Vec<PackageSpec>> {
    raw.iter()
        .map(|s| s.parse::<PackageSpec>().with_context(|| format!("invalid spec '{}'", s)))
        .collect()
}

async fn process_command(settings: Settings, spec: &str, run: &RunFlags) -> Result<i32> {
    println!("\n📦 depup\n");

    let spec: PackageSpec = spec.parse()?;
    let services = PipelineServices::npm(&settings);
    let pipeline = PackagePipeline::new(settings, services);

    let report = pipeline.run(&spec, &run.pipeline_options()).await;

    if run.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if report.success() {
        println!("\n✅ {} completed", spec);
        Ok(0)
    } else {
        println!("\n❌ {} failed", spec);
        if let Some(error) = &report.error {
            eprintln!("  - {}", error);
        }
        if !report.recoverable {
            eprintln!("  - retrying will fail the same way until this is fixed");
        }
        Ok(1)
    }
}

async fn batch_command(settings: Settings, worklist: Vec<String>, run: &RunFlags) -> Result<i32> {
    println!("\n📦 depup (Batch Mode)\n");

    if worklist.is_empty() {
        bail!("no package specs given");
    }
    let specs = parse_specs(&worklist)?;

    let options = BatchOptions::from_settings(&settings, run.pipeline_options());
    let services = PipelineServices::npm(&settings);
    let pipeline = Arc::new(PackagePipeline::new(settings, services));
    let orchestrator = BatchOrchestrator::new(pipeline);

    let result = orchestrator.run(specs, &options).await;

    if run.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    if result.success() {
        println!("\n✅ Batch completed successfully!");
        Ok(0)
    } else {
        println!("\n❌ Batch completed with errors");
        Ok(1)
    }
}

async fn vote_command(
    settings: Settings,
    name: String,
    base_version: String,
    index: u64,
    direction: &str,
    description: Option<String>,
    voter: Option<String>,
) -> Result<i32> {
    let direction: VoteDirection = direction.parse()?;
    let voter = voter
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "anonymous".to_string());

    let ledger = IntegrityLedger::new(RevisionStore::new(settings.store_dir));
    let key = RevisionKey::new(name, base_version, index);
    let snapshot = ledger.record_vote(&key, direction, description, &voter).await?;

    let status = snapshot.status();
    println!("\n🗳️  Vote recorded for {}", key);
    println!(
        "  {} Integrity: {} ({}) from {} vote(s): 👍 {} 👎 {} ➖ {}",
        status.emoji(),
        snapshot.score,
        status,
        snapshot.total(),
        snapshot.up_count,
        snapshot.down_count,
        snapshot.neutral_count
    );
    Ok(0)
}

async fn integrity_command(settings: Settings, name: &str, json: bool) -> Result<i32> {
    let ledger = IntegrityLedger::new(RevisionStore::new(settings.store_dir));
    let report = IntegrityReport::build(&ledger, name).await?;

    if json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report.to_markdown());
    }
    Ok(0)
}
