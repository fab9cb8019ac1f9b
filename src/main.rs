//! CLI entry point for the air-quality station tool.
//!
//! Provides subcommands for dumping the station list of one provider,
//! watching a provider on its refresh cadence, and exporting the combined
//! Aston sensor polygon summary.

use anyhow::{Context, Result, anyhow};
use aq_stations::cache::{CacheConfig, FileStore};
use aq_stations::config::ProviderConfig;
use aq_stations::fetch::BasicClient;
use aq_stations::model::{BoundingBox, Coordinate, Pollutant, SourceId};
use aq_stations::registry::StationRegistry;
use aq_stations::sources::{AveragingMethod, SensorQuery};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "aq_stations")]
#[command(about = "A tool to fetch and cache air-quality station data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one provider's stations and print them as JSON
    Stations {
        /// Provider to query (aqicn, opensense, openaq, iqair)
        #[arg(value_name = "SOURCE")]
        source: String,

        /// Pollutant for providers keyed by one (e.g. pm2.5, pm10, no2)
        #[arg(short, long, default_value = "pm2.5")]
        pollutant: String,

        /// Viewport bounds as "lat1,lng1,lat2,lng2" (required for aqicn)
        #[arg(short, long)]
        bounds: Option<String>,

        /// Reporting point as "lat,lon" (required for iqair)
        #[arg(long)]
        point: Option<String>,

        /// Directory for the durable station cache
        #[arg(short, long, default_value = "cache")]
        cache_dir: String,
    },
    /// Poll one provider at the cache refresh interval and log station counts
    Watch {
        /// Provider to query (aqicn, opensense, openaq, iqair)
        #[arg(value_name = "SOURCE")]
        source: String,

        /// Pollutant for providers keyed by one
        #[arg(short, long, default_value = "pm2.5")]
        pollutant: String,

        /// Viewport bounds as "lat1,lng1,lat2,lng2"
        #[arg(short, long)]
        bounds: Option<String>,

        /// Reporting point as "lat,lon"
        #[arg(long)]
        point: Option<String>,

        /// Directory for the durable station cache
        #[arg(short, long, default_value = "cache")]
        cache_dir: String,

        /// Seconds between polls
        #[arg(short = 'r', long, default_value_t = 60)]
        poll_rate: u64,

        /// Number of polls to run (0 = infinite)
        #[arg(short = 'n', long, default_value_t = 0)]
        num_polls: usize,
    },
    /// Fetch one day of combined Aston sensor polygons and print them as GeoJSON
    SensorSummary {
        /// Day to summarize, as YYYY-MM-DD
        #[arg(value_name = "DATE")]
        date: String,

        /// Averaging method (mean, median, min, max)
        #[arg(short, long, default_value = "mean")]
        method: String,

        /// Averaging frequency (e.g. 1H, 8H, 1D)
        #[arg(short, long, default_value = "1H")]
        frequency: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/aq_stations.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("aq_stations.log"));

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
    let config = ProviderConfig::from_env();

    match cli.command {
        Commands::Stations {
            source,
            pollutant,
            bounds,
            point,
            cache_dir,
        } => {
            let registry = build_registry(&config, &cache_dir)?;
            apply_selection(&registry, &source, &pollutant, bounds, point).await?;

            let stations = registry.visible_stations().await;
            info!(source, station_count = stations.len(), "Stations fetched");
            println!("{}", serde_json::to_string_pretty(&stations)?);
        }
        Commands::Watch {
            source,
            pollutant,
            bounds,
            point,
            cache_dir,
            poll_rate,
            num_polls,
        } => {
            let registry = build_registry(&config, &cache_dir)?;
            apply_selection(&registry, &source, &pollutant, bounds, point).await?;

            if num_polls == 0 {
                info!(poll_rate, "Polling infinitely. Press Ctrl+C to stop.");
            } else {
                info!(num_polls, poll_rate, "Starting poll loop");
            }

            let mut poll_count = 0;
            loop {
                if num_polls > 0 && poll_count >= num_polls {
                    break;
                }
                poll_count += 1;

                let stations = registry.visible_stations().await;
                info!(
                    poll = poll_count,
                    source,
                    station_count = stations.len(),
                    "Poll complete"
                );

                if num_polls == 0 || poll_count < num_polls {
                    tokio::time::sleep(tokio::time::Duration::from_secs(poll_rate)).await;
                }
            }
        }
        Commands::SensorSummary {
            date,
            method,
            frequency,
        } => {
            let method: AveragingMethod = method.parse().map_err(|e: String| anyhow!(e))?;
            let query = SensorQuery {
                date,
                method,
                frequency,
            };
            let registry = build_registry(&config, "cache")?;

            match registry.sensor_summary(&query).await {
                Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
                None => warn!("No sensor summary available for the requested day"),
            }
        }
    }

    Ok(())
}

fn build_registry(
    config: &ProviderConfig,
    cache_dir: &str,
) -> Result<StationRegistry<BasicClient, FileStore>> {
    std::fs::create_dir_all(cache_dir)
        .with_context(|| format!("failed to create cache directory {cache_dir}"))?;
    Ok(StationRegistry::new(
        BasicClient::new(),
        config,
        CacheConfig::default(),
        FileStore::new(cache_dir),
    ))
}

/// Pushes the CLI's selection into the registry in the order the map UI
/// would: source first, then pollutant, then viewport and point.
async fn apply_selection(
    registry: &StationRegistry<BasicClient, FileStore>,
    source: &str,
    pollutant: &str,
    bounds: Option<String>,
    point: Option<String>,
) -> Result<()> {
    let source: SourceId = source.parse().map_err(|e: String| anyhow!(e))?;
    let pollutant: Pollutant = pollutant.parse().map_err(|e: String| anyhow!(e))?;

    registry.select_source(source).await;
    registry.select_pollutant(pollutant).await;

    if let Some(raw) = bounds {
        registry.select_viewport_bounds(parse_bounds(&raw)?).await;
    }
    if let Some(raw) = point {
        registry.select_point(parse_point(&raw)?).await;
    }
    Ok(())
}

fn parse_bounds(raw: &str) -> Result<BoundingBox> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("invalid bounds {raw:?}"))?;
    let [lat1, lng1, lat2, lng2] = parts[..] else {
        return Err(anyhow!("bounds must be lat1,lng1,lat2,lng2, got {raw:?}"));
    };
    Ok(BoundingBox {
        lat1,
        lng1,
        lat2,
        lng2,
    })
}

fn parse_point(raw: &str) -> Result<Coordinate> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("invalid point {raw:?}"))?;
    let [lat, lon] = parts[..] else {
        return Err(anyhow!("point must be lat,lon, got {raw:?}"));
    };
    Ok(Coordinate { lat, lon })
}
