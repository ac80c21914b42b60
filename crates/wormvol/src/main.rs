//! wormvol CLI - commits Bacula volumes to WORM and destroys them after retention.
//!
//! Meant to run from cron on the storage daemon host:
//!
//! ```text
//! wormvol --log-file /var/spool/bacula/wormstatus.log run
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use wormvol_core::catalog::CatalogClient;
use wormvol_core::config::{Config, LogFormat};
use wormvol_core::console::ProcessConsole;
use wormvol_core::logging::init_logging;
use wormvol_core::reconcile::{ReconcilePlan, ReconcileReport, Reconciler};
use wormvol_core::store::LocalVolumeStore;
use wormvol_core::value::ValueCoercer;

#[derive(Debug, Parser)]
#[command(name = "wormvol", version, about, long_about = None)]
struct Cli {
    /// Config file (default: $WORMVOL_CONFIG, then /etc/bacula/wormvol.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory holding volume files; must end with '/'
    #[arg(long, global = true, value_name = "PATH")]
    device_root: Option<String>,

    /// Append log output to this file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, global = true, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Commit write-closed volumes to WORM and destroy expired ones
    Run {
        /// Classify only; change nothing
        #[arg(long)]
        dry_run: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show what a run would do
    Plan {
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Print as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_failure(&err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Config { json } => {
            let text = if json {
                serde_json::to_string_pretty(&config)?
            } else {
                config.to_toml().map_err(wormvol_core::Error::from)?
            };
            println!("{}", text.trim_end());
        }
        Commands::Run { dry_run, json } => {
            let report = start(&config)?.run(dry_run)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Plan { json } => {
            let plan = start(&config)?.plan()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print_plan(&plan);
            }
        }
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).map_err(wormvol_core::Error::from)?;

    if let Some(root) = &cli.device_root {
        config.general.device_root.clone_from(root);
    }
    if let Some(file) = &cli.log_file {
        config.logging.file = Some(file.clone());
    }
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    config.validate().map_err(wormvol_core::Error::from)?;
    Ok(config)
}

/// Set up logging and wire the reconciler to the real console and device.
fn start(config: &Config) -> Result<Reconciler<ProcessConsole, LocalVolumeStore>> {
    init_logging(&config.logging).context("failed to initialize logging")?;

    let locale = config.numeric_locale().map_err(wormvol_core::Error::from)?;
    let coercer = ValueCoercer::new(locale);
    let catalog = CatalogClient::new(ProcessConsole::new(&config.console), coercer);
    let store = LocalVolumeStore::new(config.general.device_root.clone());
    Ok(Reconciler::new(catalog, store, config.general.timezone))
}

fn print_plan(plan: &ReconcilePlan) {
    println!("Plan as of {}", plan.now);
    if plan.volumes.is_empty() {
        println!("  (no volumes)");
        return;
    }
    for vol in &plan.volumes {
        println!(
            "  {:<9} {:<24} {:<10} {:<6} {}",
            vol.pool, vol.volume, vol.status, vol.decision.action, vol.decision.reason
        );
        for warning in &vol.decision.warnings {
            println!("      warning: {warning}");
        }
    }
}

fn print_report(report: &ReconcileReport) {
    if report.dry_run {
        println!(
            "Dry run: {} volumes examined, {} to commit, {} to delete, {} warnings",
            report.examined, report.commit_candidates, report.delete_candidates, report.warnings
        );
        return;
    }
    println!("Examined:   {}", report.examined);
    println!("Committed:  {}", report.committed);
    if report.commit_deferred > 0 {
        println!("Deferred:   {}", report.commit_deferred);
    }
    println!("Deleted:    {}", report.deleted + report.catalog_only);
    if report.orphaned > 0 {
        println!("Orphaned:   {}", report.orphaned);
    }
    println!("Protected:  {}", report.protected);
    for failure in &report.errors {
        println!(
            "Failed {} {} ({}): {}",
            failure.action, failure.volume, failure.pool, failure.error
        );
    }
}

fn report_failure(err: &anyhow::Error) {
    let Some(core) = err.downcast_ref::<wormvol_core::Error>() else {
        eprintln!("wormvol failure: {err:#}");
        return;
    };
    eprintln!("wormvol failure: {core}");
    if let Some((_, output)) = core.console_transcript() {
        eprintln!("console said:");
        eprintln!("{}", output.trim_end());
    }
    if let Some(remediation) = core.remediation() {
        eprint!("{}", remediation.render_plain());
    }
}
