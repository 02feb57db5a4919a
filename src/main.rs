use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use log::info;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use url_metrics::{
    DetectiveConfig, UrlMetric, UrlMetricSchema, ValidationMode, normalize_query_vars,
    url_metrics_slug,
};

#[derive(Parser)]
#[command(name = "url-metrics")]
#[command(about = "Inspect URL Metric groupings offline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Group a JSON array of URL Metrics and print the collection snapshot
    Inspect {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        etag: String,
        /// JSON file with breakpoints, sample_size and freshness_ttl
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_delimiter = ',')]
        breakpoints: Option<Vec<i64>>,
        #[arg(long)]
        sample_size: Option<i64>,
        #[arg(long)]
        freshness_ttl: Option<i64>,
    },
    /// Print the storage slug for query variables given as key=value
    Slug {
        vars: Vec<String>,
        #[arg(long)]
        logged_in: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Inspect {
            input,
            etag,
            config,
            breakpoints,
            sample_size,
            freshness_ttl,
        } => {
            let mut detective_config = match config {
                Some(path) => DetectiveConfig::from_json_file(&path)
                    .with_context(|| format!("Failed to load config '{}'", path.display()))?,
                None => DetectiveConfig::default(),
            };
            if let Some(breakpoints) = breakpoints {
                detective_config = detective_config.breakpoints(&breakpoints);
            }
            if let Some(sample_size) = sample_size {
                detective_config = detective_config.sample_size(sample_size);
            }
            if let Some(freshness_ttl) = freshness_ttl {
                detective_config = detective_config.freshness_ttl(freshness_ttl);
            }
            inspect(&input, &etag, &detective_config)
        }
        Command::Slug { vars, logged_in } => {
            let query_vars = parse_query_vars(&vars)?;
            println!(
                "{}",
                url_metrics_slug(&normalize_query_vars(&query_vars, logged_in))
            );
            Ok(())
        }
    }
}

fn inspect(input: &Path, etag: &str, config: &DetectiveConfig) -> Result<()> {
    config.validate()?;

    let json = fs::read_to_string(input)
        .with_context(|| format!("Failed to read '{}'", input.display()))?;
    let values: Vec<JsonValue> = serde_json::from_str(&json)
        .with_context(|| format!("'{}' is not a JSON array", input.display()))?;

    let schema = UrlMetricSchema::default();
    let mut url_metrics = Vec::with_capacity(values.len());
    for (i, value) in values.into_iter().enumerate() {
        let url_metric = UrlMetric::from_value_with_schema(value, &schema, ValidationMode::Lenient)
            .with_context(|| format!("URL Metric {} is invalid", i))?;
        url_metrics.push(url_metric);
    }
    info!("Loaded {} URL Metrics from {}", url_metrics.len(), input.display());

    let collection = config.build_collection(url_metrics, etag)?;
    println!("{}", serde_json::to_string_pretty(&collection)?);
    Ok(())
}

fn parse_query_vars(vars: &[String]) -> Result<BTreeMap<String, JsonValue>> {
    let mut query_vars = BTreeMap::new();
    for var in vars {
        let (key, value) = var
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid query var '{}'. Expected format: key=value", var))?;
        query_vars.insert(key.trim().to_string(), JsonValue::String(value.to_string()));
    }
    Ok(query_vars)
}
