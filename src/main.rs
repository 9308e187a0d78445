//! CLI entry point for the deposit heatmap pipeline.
//!
//! Provides subcommands for building the boundary collection, preparing the
//! choropleth inputs, geocoding customer addresses and summarizing
//! customer-to-branch distances.

use anyhow::Result;
use clap::{Parser, Subcommand};
use deposit_heatmap::{
    boundaries::{fetch_and_combine, read_collection, region_sources, write_collection},
    config::PipelineConfig,
    fetch::BasicClient,
    geocode::{FixedDelay, GeocodeStore, Geocoder, NominatimClient},
    map_layers::MapLayers,
    pipeline::{attach_coordinates, choropleth_data, distance_report, geocode_queries},
    records::{for_branches, in_footprint, load_branches, load_customers},
    summary::{log_summary, write_summary},
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "deposit_heatmap")]
#[command(about = "Deposit concentration maps and branch distance statistics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download postal-code boundaries for the footprint and combine them
    Boundaries {
        /// Footprint state codes
        #[arg(short, long, value_delimiter = ',', required = true)]
        states: Vec<String>,

        /// GeoJSON file to write the combined collection to
        #[arg(short, long, default_value = "geojsondata.json")]
        output: PathBuf,
    },
    /// Aggregate deposits by postal code and reduce the boundaries to match
    Choropleth {
        /// Customer deposit CSV
        #[arg(long, default_value = "geo.csv")]
        deposits: PathBuf,

        /// Branch reference CSV
        #[arg(long, default_value = "branch.csv")]
        branches: PathBuf,

        /// Combined boundary collection produced by `boundaries`
        #[arg(long, default_value = "geojsondata.json")]
        boundaries: PathBuf,

        /// Only include customers of these branches (repeatable)
        #[arg(long = "branch")]
        branch_filter: Vec<String>,

        /// GeoJSON file to write the filtered collection to
        #[arg(short, long, default_value = "cleaned_geodata.json")]
        output: PathBuf,

        /// JSON file with the choropleth values and branch markers
        #[arg(long, default_value = "map_layers.json")]
        layers: PathBuf,
    },
    /// Geocode footprint customer addresses into a resumable store
    Geocode {
        /// Customer deposit CSV
        #[arg(long, default_value = "geo.csv")]
        deposits: PathBuf,

        /// Footprint state codes (empty = all)
        #[arg(short, long, value_delimiter = ',')]
        states: Vec<String>,

        /// Geocode store to resume from and write to
        #[arg(long, default_value = "coordinates.json")]
        store: PathBuf,
    },
    /// Compute customer-to-branch distances and summarize them per branch
    Distances {
        /// Customer deposit CSV
        #[arg(long, default_value = "geo.csv")]
        deposits: PathBuf,

        /// Branch reference CSV
        #[arg(long, default_value = "branch.csv")]
        branches: PathBuf,

        /// Geocode store written by `geocode`
        #[arg(long, default_value = "coordinates.json")]
        store: PathBuf,

        /// Footprint state codes (empty = all)
        #[arg(short, long, value_delimiter = ',')]
        states: Vec<String>,

        /// CSV file to write the summary table to
        #[arg(short, long, default_value = "distance_summary.csv")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = PipelineConfig::from_env()?;

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/deposit_heatmap.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("deposit_heatmap.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Boundaries { states, output } => {
            let sources = region_sources(&config.boundary_base_url, &states)?;
            let client = BasicClient::with_user_agent(&config.geocoder_user_agent)?;
            let combined = fetch_and_combine(&client, &sources).await?;
            write_collection(&output, &combined)?;
        }
        Commands::Choropleth {
            deposits,
            branches,
            boundaries,
            branch_filter,
            output,
            layers,
        } => {
            let customers = for_branches(&load_customers(&deposits)?, &branch_filter);
            let branch_records = load_branches(&branches)?;
            let combined = read_collection(&boundaries)?;

            let data = choropleth_data(&customers, &combined, &config.boundary_key);
            write_collection(&output, &data.boundaries)?;

            MapLayers::new(
                &config.boundary_key,
                data.deposits_by_postal_code,
                &branch_records,
            )
            .write(&layers)?;
        }
        Commands::Geocode {
            deposits,
            states,
            store,
        } => {
            geocode(&config, &deposits, &states, &store).await?;
        }
        Commands::Distances {
            deposits,
            branches,
            store,
            states,
            output,
        } => {
            let all_records = load_customers(&deposits)?;
            let footprint = in_footprint(&all_records, &states);
            let branch_records = load_branches(&branches)?;
            let geocoded = GeocodeStore::load(&store)?;

            let located = attach_coordinates(&footprint, &geocoded);
            let report = distance_report(
                &located,
                &branch_records,
                &all_records,
                config.outlier_threshold_miles,
            );
            log_summary(&report.summary);
            write_summary(&output, &report.summary)?;
        }
    }

    Ok(())
}

/// Geocodes every footprint address sequentially and persists the results
/// as soon as the batch finishes.
#[tracing::instrument(skip(config), fields(deposits = %deposits.display(), store = %store_path.display()))]
async fn geocode(
    config: &PipelineConfig,
    deposits: &Path,
    states: &[String],
    store_path: &Path,
) -> Result<()> {
    let footprint = in_footprint(&load_customers(deposits)?, states);
    let queries = geocode_queries(&footprint);
    let previous = GeocodeStore::load_or_default(store_path)?;

    info!(
        addresses = queries.len(),
        timeout_secs = config.geocode_timeout.as_secs_f64(),
        delay_secs = config.geocode_delay.as_secs_f64(),
        "Starting geocode batch"
    );

    let client = BasicClient::with_user_agent(&config.geocoder_user_agent)?;
    let geocoder = Geocoder::new(
        NominatimClient::new(client, config.geocoder_url.clone()),
        FixedDelay(config.geocode_delay),
        config.geocode_timeout,
    );

    let results = geocoder.geocode_batch(&queries, &previous).await;
    previous.merged_with(results).save(store_path)?;
    Ok(())
}
