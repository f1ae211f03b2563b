//! Index build pipeline.
//!
//! Reads a world-cities CSV (optionally gzipped) and writes a spatial index
//! directory that the query side can open.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use meridian::dataset::open_dataset;
use meridian::{build_index, EngineConfig, PlaceRecord};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Build a reverse geocoding index from a world-cities CSV")]
struct Args {
    /// CSV dataset to import (.csv or .csv.gz)
    #[arg(short, long)]
    file: PathBuf,

    /// Index directory to create or replace
    #[arg(long)]
    index: PathBuf,

    /// Engine config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Meridian Ingest Pipeline");
    info!("File: {}", args.file.display());

    let config = match &args.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let places = load_places(&args)?;

    let report = build_index(places, &args.index, &config)
        .with_context(|| format!("Failed to build index at {}", args.index.display()))?;

    info!(
        "Ingestion complete: {} places in {} ms",
        report.doc_count, report.elapsed_ms
    );
    Ok(())
}

fn load_places(args: &Args) -> Result<Vec<PlaceRecord>> {
    let reader = open_dataset(&args.file).context("Failed to open dataset")?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} places read ({per_sec})")?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let mut places = Vec::new();
    for place in reader {
        places.push(place.context("Failed to read dataset")?);
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!("Read {} places from {}", places.len(), args.file.display());
    Ok(places)
}
