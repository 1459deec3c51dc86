//! Operator entry point for kinship registry reconciliation passes.
//!
//! # Responsibility
//! - Open the registry database and run one pass per invocation.
//! - Print the pass report; exit non-zero only when a pass could not run.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kinship_core::{
    default_log_level, init_logging, open_db, GeoLookupConfig, HttpGeoLookup, LinkRepair,
    LinkRepairOptions, LocationBackfill, MarriageBackfill, MemberRepository, ReconcileReport,
    RelationService, SqliteMarriageRepository, SqliteMemberRepository, SqliteUnionRepository,
};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "kinship")]
#[command(about = "Kinship registry maintenance passes", version)]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "KINSHIP_DB")]
    db: PathBuf,

    /// trace|debug|info|warn|error (defaults per build mode)
    #[arg(long, env = "KINSHIP_LOG_LEVEL")]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; file logging is off when unset
    #[arg(long, env = "KINSHIP_LOG_DIR")]
    log_dir: Option<String>,

    /// Location hierarchy service base URL
    #[arg(long, env = "KINSHIP_GEO_API")]
    geo_api: Option<String>,

    /// Per-request timeout for location lookups
    #[arg(long, default_value_t = 10_000)]
    geo_timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create marriage records for legacy spouse references
    BackfillMarriages,
    /// Recompute member union back-pointers from union records
    RepairLinks {
        /// Also recompute every lineage cache afterwards
        #[arg(long)]
        refresh_cache: bool,
    },
    /// Fill denormalized location names and full names
    BackfillLocations,
    /// Recompute every member's lineage cache
    RefreshCache,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli
            .log_level
            .clone()
            .unwrap_or_else(|| default_log_level().to_string());
        if let Err(err) = init_logging(level.as_str(), log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    match run(&cli) {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("event=cli_run module=cli status=error error={err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ReconcileReport> {
    let conn = open_db(&cli.db)
        .with_context(|| format!("failed to open database {}", cli.db.display()))?;
    let members = SqliteMemberRepository::try_new(&conn)?;
    // Ctrl-C terminates the process; every pass is safe to re-run.
    let cancel = AtomicBool::new(false);

    let report = match &cli.command {
        Command::BackfillMarriages => {
            let marriages = SqliteMarriageRepository::try_new(&conn)?;
            MarriageBackfill::new(members, marriages)
                .run(&cancel)
                .context("marriage backfill could not run")?
        }
        Command::RepairLinks { refresh_cache } => {
            let unions = SqliteUnionRepository::try_new(&conn)?;
            LinkRepair::new(members, unions)
                .run(
                    LinkRepairOptions {
                        refresh_cache: *refresh_cache,
                    },
                    &cancel,
                )
                .context("link repair could not run")?
        }
        Command::BackfillLocations => {
            let mut config = GeoLookupConfig {
                timeout: Duration::from_millis(cli.geo_timeout_ms),
                ..GeoLookupConfig::default()
            };
            if let Some(base_url) = cli.geo_api.as_deref() {
                config.base_url = base_url.to_string();
            }
            let lookup = HttpGeoLookup::new(&config)
                .with_context(|| format!("failed to build lookup client for {}", config.base_url))?;
            LocationBackfill::new(members, lookup)
                .run(&cancel)
                .context("location backfill could not run")?
        }
        Command::RefreshCache => {
            let total = members.count_members()?;
            let unions = SqliteUnionRepository::try_new(&conn)?;
            let refresh = RelationService::new(members, unions)
                .refresh_all_family_links()
                .context("lineage cache refresh could not run")?;
            info!(
                "event=cli_run module=cli status=ok command=refresh-cache members={} failed={}",
                refresh.refreshed, refresh.failed
            );
            ReconcileReport {
                scanned: total,
                updated: refresh.refreshed as u64,
                errored: refresh.failed as u64,
                ..ReconcileReport::default()
            }
        }
    };
    Ok(report)
}
