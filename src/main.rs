//! CLI entry point for the MBTA bus data builder.
//!
//! Provides subcommands for generating the full stops-and-shapes dataset
//! from the MBTA V3 API and for repairing routes left incomplete by
//! earlier runs.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use mbta_bus_data::collect::ApiConfig;
use mbta_bus_data::dataset::Dataset;
use mbta_bus_data::fetch::{BasicClient, HttpClient, UrlParam};
use mbta_bus_data::persist::{self, CANONICAL_FILE, EMBEDDED_FILE};
use mbta_bus_data::pipeline::{self, Summary};
use mbta_bus_data::reconcile;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "mbta_bus_data")]
#[command(about = "Builds MBTA bus reference data (stops and route shapes)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect stops and shapes for every bus route and write both data files
    Generate {
        /// Directory to write mbta-bus-data.js and mbta-bus-data.json into
        #[arg(short, long, default_value = ".")]
        output_dir: String,

        /// Base URL of the MBTA V3 API
        #[arg(long, default_value = "https://api-v3.mbta.com")]
        base_url: String,
    },
    /// Re-fetch the missing half of routes left incomplete by earlier runs
    Repair {
        /// Directory holding the data files from a previous generate run
        #[arg(short, long, default_value = ".")]
        output_dir: String,

        /// Base URL of the MBTA V3 API
        #[arg(long, default_value = "https://api-v3.mbta.com")]
        base_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/mbta_bus_data.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("mbta_bus_data.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    // A keyed request gets a much higher rate-limit quota, so honor
    // MBTA_API_KEY when present; anonymous access works too.
    match std::env::var("MBTA_API_KEY") {
        Ok(key) if !key.is_empty() => {
            info!("Using API key from MBTA_API_KEY");
            let client = UrlParam::mbta_api_key(BasicClient::new(), key);
            run(cli.command, &client).await
        }
        _ => run(cli.command, &BasicClient::new()).await,
    }
}

async fn run<C: HttpClient>(command: Commands, client: &C) -> Result<()> {
    match command {
        Commands::Generate {
            output_dir,
            base_url,
        } => generate(client, &base_url, &output_dir).await,
        Commands::Repair {
            output_dir,
            base_url,
        } => repair(client, &base_url, &output_dir).await,
    }
}

async fn generate<C: HttpClient>(client: &C, base_url: &str, output_dir: &str) -> Result<()> {
    let cfg = ApiConfig::new(base_url)?;

    let dataset = pipeline::collect_all(client, &cfg).await?;

    std::fs::create_dir_all(output_dir)?;
    let (canonical_path, embedded_path) = data_paths(output_dir);
    persist::write_canonical(&dataset, &canonical_path)?;
    persist::write_embedded(&dataset, &embedded_path)?;
    info!(
        canonical = %canonical_path.display(),
        embedded = %embedded_path.display(),
        "Saved bus data"
    );

    Summary::of(&dataset).log();
    Ok(())
}

async fn repair<C: HttpClient>(client: &C, base_url: &str, output_dir: &str) -> Result<()> {
    let cfg = ApiConfig::new(base_url)?;

    let (canonical_path, embedded_path) = data_paths(output_dir);
    let mut dataset = load_existing(&canonical_path, &embedded_path)?;
    info!(
        stop_routes = dataset.stop_route_count(),
        shape_routes = dataset.shape_route_count(),
        "Loaded existing dataset"
    );

    let report = reconcile::repair(client, &cfg, &mut dataset).await;
    if report.attempted == 0 {
        // Nothing was missing; leave the files untouched.
        return Ok(());
    }

    persist::write_canonical(&dataset, &canonical_path)?;
    persist::write_embedded(&dataset, &embedded_path)?;
    info!(
        attempted = report.attempted,
        recovered_stops = report.recovered_stops,
        recovered_shapes = report.recovered_shapes,
        "Saved repaired bus data"
    );

    Summary::of(&dataset).log();
    Ok(())
}

fn data_paths(output_dir: &str) -> (PathBuf, PathBuf) {
    let dir = Path::new(output_dir);
    (dir.join(CANONICAL_FILE), dir.join(EMBEDDED_FILE))
}

/// Loads the dataset to repair. The canonical JSON file is the source of
/// truth; the embedded JS file is parsed only for datasets written before
/// the canonical file existed.
fn load_existing(canonical_path: &Path, embedded_path: &Path) -> Result<Dataset> {
    if canonical_path.exists() {
        return persist::read_canonical(canonical_path);
    }
    if embedded_path.exists() {
        info!(
            file = %embedded_path.display(),
            "Canonical file not found, falling back to the embedded JS file"
        );
        return persist::read_embedded(embedded_path);
    }
    bail!(
        "no existing dataset found ({} or {}), run `generate` first",
        canonical_path.display(),
        embedded_path.display()
    );
}
