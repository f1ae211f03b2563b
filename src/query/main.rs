//! One-shot reverse geocoding lookup.
//!
//! Opens an index, answers a single point and radius query and prints the
//! result as JSON on stdout.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use meridian::{EngineConfig, ReverseGeocoder, ScoredPlace};

#[derive(Parser, Debug)]
#[command(name = "query")]
#[command(about = "Reverse geocoding lookup against a built index")]
struct Args {
    /// Index directory
    #[arg(long)]
    index: PathBuf,

    /// Latitude in degrees
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    /// Longitude in degrees
    #[arg(long, allow_hyphen_values = true)]
    lon: f64,

    /// Search radius in kilometres
    #[arg(long)]
    radius_km: f64,

    /// Maximum number of places to consider
    #[arg(long, default_value = "10")]
    limit: usize,

    /// Print distinct countries instead of places
    #[arg(long)]
    countries: bool,

    /// Engine config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
}

/// One entry of the places output.
#[derive(Debug, Serialize)]
struct PlaceResult<'a> {
    id: u64,
    distance_km: f64,
    country: &'a str,
    city: &'a str,
    display_name: &'a str,
    region: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    population: Option<i64>,
    lat: f64,
    lon: f64,
}

impl<'a> From<&'a ScoredPlace> for PlaceResult<'a> {
    fn from(scored: &'a ScoredPlace) -> Self {
        let place = &scored.place;
        Self {
            id: scored.id,
            distance_km: scored.distance_km,
            country: &place.country,
            city: &place.city,
            display_name: &place.display_name,
            region: &place.region,
            population: place.known_population(),
            lat: place.latitude,
            lon: place.longitude,
        }
    }
}

fn main() -> Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let geocoder = ReverseGeocoder::open(&args.index, config)
        .with_context(|| format!("Failed to open index at {}", args.index.display()))?;

    debug!(
        "Query lat={} lon={} radius_km={} limit={}",
        args.lat, args.lon, args.radius_km, args.limit
    );

    let output = if args.countries {
        let countries = geocoder
            .nearest_countries(args.lat, args.lon, args.radius_km, args.limit)
            .context("Query failed")?;
        serde_json::to_string_pretty(&countries)?
    } else {
        let scored = geocoder
            .reader()
            .nearest_places_scored(args.lat, args.lon, args.radius_km, args.limit)
            .context("Query failed")?;
        let results: Vec<PlaceResult> = scored.iter().map(PlaceResult::from).collect();
        serde_json::to_string_pretty(&results)?
    };

    println!("{}", output);
    Ok(())
}
