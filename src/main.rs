use anyhow::{Context, Result};
use citibike_forecast::config::{load_config, PipelineConfig, TrackingConfig};
use citibike_forecast::data_models::DATETIME_FORMAT;
use citibike_forecast::metrics::METRICS;
use citibike_forecast::parsers::predictions::{read_predictions, PredictionsStatus};
use citibike_forecast::registry::{RunQuery, TrackingBackend, TrackingStore};
use citibike_forecast::report::{self, ModelComparison};
use citibike_forecast::{run_inference, FeatureContract};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "citibike_forecast")]
#[command(about = "Hourly Citi Bike ride forecasts from the best tracked model", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run inference and write the predictions file
    Predict(PredictArgs),
    /// Show predicted rides per station from the predictions file
    Predictions(PredictionsArgs),
    /// Compare tracked runs by their error metric
    Runs(RunsArgs),
}

#[derive(Args, Debug)]
struct PredictArgs {
    /// JSON file with pipeline settings; flags below take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Feature table (CSV)
    #[arg(long, env = "FEATURES_PATH")]
    features: Option<PathBuf>,

    /// Predictions output file (CSV), replaced on every run
    #[arg(long, env = "PREDICTIONS_PATH")]
    output: Option<PathBuf>,

    /// Experiment to pick the model from
    #[arg(long)]
    experiment: Option<String>,

    /// Error metric used to rank runs (lower is better)
    #[arg(long)]
    metric: Option<String>,

    /// Rows kept per station
    #[arg(long)]
    window: Option<usize>,

    /// Attempts for tracking service calls that fail transiently
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Tracking service request timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

#[derive(Args, Debug)]
struct PredictionsArgs {
    #[arg(long, env = "PREDICTIONS_PATH", default_value = "./data/predictions/predictions.csv")]
    output: PathBuf,

    /// Station to show hourly detail for
    #[arg(long)]
    station: Option<String>,
}

#[derive(Args, Debug)]
struct RunsArgs {
    #[arg(long, default_value = "citibike_trip_prediction")]
    experiment: String,

    #[arg(long, default_value = "mae")]
    metric: String,

    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

fn tracking_config(timeout_secs: u64) -> Result<TrackingConfig> {
    let mut config = TrackingConfig::from_env().context("Tracking service is not configured")?;
    config.request_timeout = Duration::from_secs(timeout_secs);
    info!("Tracking URI: {}", config.tracking_uri);
    Ok(config)
}

fn pipeline_config(args: &PredictArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config file {:?}", path))?,
        None => PipelineConfig::default(),
    };
    if let Some(features) = &args.features {
        config.features_path = features.clone();
    }
    if let Some(output) = &args.output {
        config.output_path = output.clone();
    }
    if let Some(experiment) = &args.experiment {
        config.experiment_name = experiment.clone();
    }
    if let Some(metric) = &args.metric {
        config.metric = metric.clone();
    }
    if let Some(window) = args.window {
        config.window = window;
    }
    if let Some(max_attempts) = args.max_attempts {
        config.retry_max_attempts = max_attempts;
    }
    Ok(config)
}

async fn predict(args: PredictArgs) -> Result<()> {
    let config = pipeline_config(&args)?;
    info!("Features: {:?}", config.features_path);
    info!("Output: {:?}", config.output_path);
    info!("Experiment: {} (ranked by {})", config.experiment_name, config.metric);
    info!("Window: {} rows per station", config.window);

    let backend = TrackingBackend::from_config(&tracking_config(args.timeout_secs)?)
        .context("Failed to set up tracking backend")?;

    let result = run_inference(&config, &backend, FeatureContract::citibike_v1()).await;
    METRICS.lock().log_summary();

    let summary = result.context("Inference run failed")?;
    println!(
        "Predictions saved to {} ({} rows, {} stations, model {})",
        summary.output_path.display(),
        summary.predictions,
        summary.stations,
        summary.model_uri
    );
    Ok(())
}

fn show_predictions(args: PredictionsArgs) -> Result<()> {
    let rows = match read_predictions(&args.output)
        .with_context(|| format!("Failed to read predictions from {:?}", args.output))?
    {
        PredictionsStatus::NotRunYet => {
            warn!("No predictions file at {:?}", args.output);
            println!("Prediction file not found. Please run inference first.");
            return Ok(());
        }
        PredictionsStatus::Available(rows) => rows,
    };

    match args.station {
        None => {
            println!("{:<16} {:>8} {:>16} {:>16}", "Station", "Hours", "Total Predicted", "Peak");
            for s in report::summarize_all(&rows) {
                println!(
                    "{:<16} {:>8} {:>16} {:>16}",
                    s.station_id,
                    s.hours,
                    format!("{:.0}", s.total_predicted.trunc()),
                    format!("{:.0}", s.peak_predicted.trunc())
                );
            }
        }
        Some(station) => {
            let summary = report::summarize_station(&rows, &station).with_context(|| {
                format!(
                    "Station {} not in predictions; available: {}",
                    station,
                    report::station_ids(&rows).join(", ")
                )
            })?;
            println!("Station {}", summary.station_id);
            println!("Total Predicted Rides: {:.0}", summary.total_predicted.trunc());
            println!(
                "Peak Prediction: {:.0} at {}",
                summary.peak_predicted.trunc(),
                summary.peak_at.format(DATETIME_FORMAT)
            );
            println!();
            println!("{:<20} {:>16}", "datetime", "predicted rides");
            for row in report::station_rows(&rows, &station) {
                println!(
                    "{:<20} {:>16.2}",
                    row.timestamp.format(DATETIME_FORMAT).to_string(),
                    row.predicted_ride_count
                );
            }
        }
    }
    Ok(())
}

async fn compare_runs(args: RunsArgs) -> Result<()> {
    let backend = TrackingBackend::from_config(&tracking_config(args.timeout_secs)?)
        .context("Failed to set up tracking backend")?;
    let runs = backend
        .list_runs(&args.experiment, &RunQuery::all_by(&args.metric))
        .await
        .with_context(|| format!("Failed to list runs of '{}'", args.experiment))?;

    let comparison = ModelComparison::from_runs(&runs, &args.metric);
    let metric = args.metric.to_uppercase();
    match (comparison.best(), comparison.worst()) {
        (Some(best), Some(worst)) => {
            println!("Best {}: {:.2}", metric, best.score);
            println!("Worst {}: {:.2}", metric, worst.score);
        }
        _ => {
            println!("No runs in '{}' report {}.", args.experiment, args.metric);
            return Ok(());
        }
    }
    println!();
    println!("{:<32} {:<34} {:>10}", "Model", "Run", metric);
    for score in &comparison.scores {
        println!("{:<32} {:<34} {:>10.4}", score.model, score.run_id, score.score);
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    if dotenvy::dotenv().is_ok() {
        eprintln!("Loaded environment from .env");
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Predict(args) => predict(args).await,
        Command::Predictions(args) => show_predictions(args),
        Command::Runs(args) => compare_runs(args).await,
    }
}
