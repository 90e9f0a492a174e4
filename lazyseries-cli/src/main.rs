//! CLI for lazyseries.
//!
//! Loads a JSON dataset into an in-memory chunk store, resolves a series
//! selection into lazy iterators and reads them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use lazyseries::{
    ChunkStore, Interval, LabelMatcher, LazySeriesConfig, LazySeriesIterator, MemoryStore, Metric,
    QueryContext, SamplePair, SeriesIterator, Time, lazy_series_iterators,
};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// lazyseries: lazy series lookups over a JSON dataset.
#[derive(Parser)]
#[command(name = "lazyseries", version, about)]
struct Cli {
    /// Path to a JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Print the value at or before a point in time for every selected series.
    Point {
        #[command(flatten)]
        selection: Selection,

        /// Evaluation time in milliseconds.
        #[arg(long)]
        at: i64,
    },

    /// Print every sample in a time range for every selected series.
    Range {
        #[command(flatten)]
        selection: Selection,

        /// Range start in milliseconds (inclusive). Defaults to the earliest time.
        #[arg(long, allow_hyphen_values = true)]
        from: Option<i64>,

        /// Range end in milliseconds (inclusive). Defaults to the latest time.
        #[arg(long, allow_hyphen_values = true)]
        through: Option<i64>,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// List the selected series without reading their samples.
    Series {
        #[command(flatten)]
        selection: Selection,
    },
}

/// Dataset and matchers shared by every command.
#[derive(Args)]
struct Selection {
    /// Path to the JSON dataset.
    data: PathBuf,

    /// Label matcher (`k=v`, `k!=v`, `k=~re`, `k!~re`). Repeatable.
    #[arg(long = "match", value_name = "MATCHER", required = true)]
    matchers: Vec<String>,
}

/// Output format for range results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON array of objects.
    Json,
}

/// One series in a dataset file.
#[derive(Deserialize)]
struct SeriesRecord {
    labels: BTreeMap<String, String>,
    #[serde(default)]
    samples: Vec<(i64, f64)>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Point { selection, at } => cmd_point(&selection, Time::from_millis(at), &config),
        Commands::Range {
            selection,
            from,
            through,
            format,
        } => {
            let interval = Interval::new(
                from.map_or(Time::EARLIEST, Time::from_millis),
                through.map_or(Time::LATEST, Time::from_millis),
            );
            cmd_range(&selection, interval, &format, &config)
        }
        Commands::Series { selection } => cmd_series(&selection, &config),
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<LazySeriesConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(LazySeriesConfig::from_json_file(path)?),
        None => Ok(LazySeriesConfig::default()),
    }
}

/// Reads a dataset file into a [`MemoryStore`].
fn load_store(path: &Path) -> Result<Arc<dyn ChunkStore>, Box<dyn std::error::Error>> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read dataset '{}': {e}", path.display()))?;
    let records: Vec<SeriesRecord> = serde_json::from_str(&data)
        .map_err(|e| format!("invalid dataset '{}': {e}", path.display()))?;

    let mut store = MemoryStore::new();
    for record in records {
        let samples = record
            .samples
            .into_iter()
            .map(|(t, v)| SamplePair::new(t, v));
        store.append(Metric::new(record.labels), samples);
    }
    tracing::debug!("loaded {} series from {}", store.series_count(), path.display());
    Ok(Arc::new(store))
}

fn select(
    selection: &Selection,
    interval: Interval,
    config: &LazySeriesConfig,
) -> Result<Vec<LazySeriesIterator>, Box<dyn std::error::Error>> {
    let store = load_store(&selection.data)?;
    let matchers = selection
        .matchers
        .iter()
        .map(|m| LabelMatcher::from_str(m))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(lazy_series_iterators(
        &store,
        &QueryContext::background(),
        interval.from,
        interval.through,
        &matchers,
        config,
    )?)
}

/// Implements `lazyseries point`.
fn cmd_point(
    selection: &Selection,
    at: Time,
    config: &LazySeriesConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let handles = select(selection, Interval::new(Time::EARLIEST, at), config)?;

    println!("series,timestamp_ms,value");
    for handle in &handles {
        let sample = handle.value_at_or_before_time(at)?;
        if sample.is_zero() {
            continue;
        }
        let name = csv_field(&handle.metric().to_string());
        println!("{name},{},{}", sample.timestamp, sample.value);
    }
    Ok(())
}

/// Implements `lazyseries range`.
fn cmd_range(
    selection: &Selection,
    interval: Interval,
    format: &OutputFormat,
    config: &LazySeriesConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let handles = select(selection, interval, config)?;

    let mut results = Vec::with_capacity(handles.len());
    for handle in &handles {
        results.push((handle.metric(), handle.range_values(interval)?));
    }

    match format {
        OutputFormat::Csv => {
            println!(
                "# from={}, through={}, series={}",
                interval.from,
                interval.through,
                results.len()
            );
            println!("series,timestamp_ms,value");
            for (metric, samples) in &results {
                let name = csv_field(&metric.to_string());
                for sample in samples {
                    println!("{name},{},{}", sample.timestamp, sample.value);
                }
            }
        }
        OutputFormat::Json => {
            let series: Vec<serde_json::Value> = results
                .iter()
                .map(|(metric, samples)| {
                    let data: Vec<serde_json::Value> = samples
                        .iter()
                        .map(|s| {
                            serde_json::json!({
                                "timestamp_ms": s.timestamp,
                                "value": s.value,
                            })
                        })
                        .collect();
                    serde_json::json!({
                        "labels": metric,
                        "count": samples.len(),
                        "data": data,
                    })
                })
                .collect();

            let output = serde_json::json!({
                "from": interval.from,
                "through": interval.through,
                "series": series,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Implements `lazyseries series`.
fn cmd_series(
    selection: &Selection,
    config: &LazySeriesConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let handles = select(selection, Interval::new(Time::EARLIEST, Time::LATEST), config)?;

    println!("Series: {}", handles.len());
    for handle in &handles {
        println!("  {}", handle.metric());
    }
    Ok(())
}

/// Quotes a CSV field if it contains a comma or quote.
fn csv_field(field: &str) -> String {
    if field.contains([',', '"']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
