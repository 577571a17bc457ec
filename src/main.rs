use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;
use crate::pipeline::Engine;

mod acgme;
mod calendar;
mod classify;
mod cohort;
mod config;
mod continuity;
mod db;
mod dedup;
mod error;
mod loader;
mod models;
mod normalize;
mod pipeline;
mod report;
mod rvu;
mod summary;
mod volumes;

#[derive(Parser)]
#[command(name = "clinic-datamart")]
#[command(about = "Builds clinic dashboard datamarts from warehouse snapshots", long_about = None)]
struct Cli {
    /// TOML file overriding the built-in rosters and code lists
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RunArgs {
    /// Read source tables from CSV files instead of WAREHOUSE_URL
    #[arg(long)]
    csv_dir: Option<PathBuf>,
    /// Also write the key/value JSON to this file
    #[arg(long)]
    kv: Option<PathBuf>,
    /// Reference date for rolling windows (defaults to today)
    #[arg(long)]
    as_of: Option<NaiveDate>,
    /// Skip writing the datamart to DATABASE_URL
    #[arg(long)]
    no_db: bool,
}

impl RunArgs {
    fn as_of(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Local::now().date_naive())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the datamart schema
    InitDb,
    /// Patient panel and monthly visit volumes
    Panel {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Resident encounters, notes and ACGME statistics
    Residency {
        #[command(flatten)]
        run: RunArgs,
        /// Write a markdown ACGME summary
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Provider charges and work RVUs
    Rvu {
        #[command(flatten)]
        run: RunArgs,
    },
}

async fn connect(var: &str) -> anyhow::Result<PgPool> {
    let url = std::env::var(var).with_context(|| format!("{var} must be set"))?;
    PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .with_context(|| format!("failed to connect to Postgres at {var}"))
}

fn write_kv(path: Option<&Path>, kv: &str) -> anyhow::Result<()> {
    if let Some(path) = path {
        std::fs::write(path, kv)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Key/value data written to {}.", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::InitDb => {
            let pool = connect("DATABASE_URL").await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Panel { run } => {
            let engine = Engine::new(&config, run.as_of())?;
            let sources = match &run.csv_dir {
                Some(dir) => loader::panel_sources(dir)?,
                None => db::fetch_panel_sources(&connect("WAREHOUSE_URL").await?).await?,
            };
            let datamart = engine.panel(sources)?;
            let kv = datamart.kv_json()?;
            write_kv(run.kv.as_deref(), &kv)?;
            if !run.no_db {
                db::write_panel(&connect("DATABASE_URL").await?, &datamart, &kv).await?;
            }

            println!(
                "Panel datamart: {} patients, {} encounters, {} office visits across {} clinics.",
                datamart.patients.len(),
                datamart.encounters.len(),
                datamart.volume_visits.len(),
                datamart.index.clinics.len()
            );
            for clinic in &datamart.index.clinics {
                println!(
                    "- {clinic}: {} panel providers",
                    datamart.index.providers_for(clinic).len()
                );
            }
        }
        Commands::Residency { run, report: report_path } => {
            let as_of = run.as_of();
            let engine = Engine::new(&config, as_of)?;
            let sources = match &run.csv_dir {
                Some(dir) => loader::residency_sources(dir)?,
                None => db::fetch_residency_sources(&connect("WAREHOUSE_URL").await?).await?,
            };
            let datamart = engine.residency(sources)?;
            let kv = datamart.kv_json()?;
            write_kv(run.kv.as_deref(), &kv)?;
            if !run.no_db {
                db::write_residency(&connect("DATABASE_URL").await?, &datamart, &kv).await?;
            }

            if let Some(out) = report_path {
                std::fs::write(&out, report::build_report(as_of, &datamart.stats))
                    .with_context(|| format!("failed to write {}", out.display()))?;
                println!("Report written to {}.", out.display());
            }

            println!(
                "Residency datamart: {} encounters and {} notes for {} residents.",
                datamart.encounters.len(),
                datamart.notes.len(),
                config.all_residents().len()
            );
            if let Some(total) = datamart.stats.get(acgme::OVERALL).and_then(|s| s.total()) {
                println!(
                    "Overall provider continuity {} ({}).",
                    total.provider_continuity.percent, total.provider_continuity.comment
                );
            }
        }
        Commands::Rvu { run } => {
            let as_of = run.as_of();
            let engine = Engine::new(&config, as_of)?;
            let sources = match &run.csv_dir {
                Some(dir) => loader::rvu_sources(dir)?,
                None => {
                    let since = calendar::lookback_start(as_of, config.charge_lookback_years);
                    let pool = connect("WAREHOUSE_URL").await?;
                    db::fetch_rvu_sources(&pool, &config.provider_names(), since).await?
                }
            };
            let datamart = engine.rvu(sources)?;
            let kv = datamart.kv_json()?;
            write_kv(run.kv.as_deref(), &kv)?;
            if !run.no_db {
                db::write_rvu(&connect("DATABASE_URL").await?, &datamart, &kv).await?;
            }

            println!("RVU datamart: {} charges.", datamart.charges.len());
            for (provider, wrvu) in
                rvu::wrvu_by_provider(&datamart.charges, &datamart.summary.providers)
            {
                println!("- {provider}: {wrvu:.2} wRVU");
            }
        }
    }

    Ok(())
}
