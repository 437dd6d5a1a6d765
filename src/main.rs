//! Setup Decision Core - Main Entry Point
//!
//! Replays newline-delimited realtime messages from a file or stdin through
//! the per-symbol decision engine and logs a summary per symbol.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{info, warn, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use setup_decision_core::common::channels::create_event_channel_with_size;
use setup_decision_core::config::load_config;
use setup_decision_core::ml::registry::ModelRegistry;
use setup_decision_core::ml::DirectoryWeightsSource;
use setup_decision_core::{
    normalize_realtime_event, run_event_router, EngineSettings, MlLayer, RawEvent, RolloutPolicies,
};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Newline-delimited JSON messages to replay; stdin when omitted
    #[arg(long)]
    replay: Option<String>,

    /// Symbol for events that carry none
    #[arg(long, default_value = "SPX")]
    symbol: String,

    /// User id for model rollout bucketing
    #[arg(long, env = "ML_ROLLOUT_USER")]
    user_id: Option<String>,

    /// Directory holding `<model>.json` weight files
    #[arg(long, env = "ML_WEIGHTS_DIR")]
    weights_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG wins over --log-level when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(level).into()));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if args.log_json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    info!("Starting setup decision core");
    info!("Configuration file: {}", args.config);

    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let mut config = load_config(Some(&args.config))?;
    if args.user_id.is_some() {
        config.settings.user_id = args.user_id.clone();
    }
    if args.weights_dir.is_some() {
        config.ml.weights_dir = args.weights_dir.clone();
    }

    // Model registry: bundled models first, then anything published on disk
    let registry = if config.ml.builtin_models {
        ModelRegistry::with_builtin_defaults()
    } else {
        ModelRegistry::new()
    };
    if let Some(dir) = &config.ml.weights_dir {
        let installed = registry.load_from(&DirectoryWeightsSource::new(dir)).await;
        info!(dir = %dir, installed, "Loaded model weights");
    }
    let ml = Arc::new(MlLayer::new(
        Arc::new(registry),
        RolloutPolicies::from(&config.ml),
    ));

    let settings = EngineSettings::from(&config);
    let (tx, rx) = create_event_channel_with_size(config.settings.channel_size);
    let router = tokio::spawn(run_event_router(rx, settings, ml, args.symbol.clone()));

    let reader: Box<dyn AsyncRead + Unpin + Send> = match &args.replay {
        Some(path) => {
            info!("Replaying {}", path);
            Box::new(tokio::fs::File::open(path).await?)
        }
        None => Box::new(tokio::io::stdin()),
    };
    let mut lines = BufReader::new(reader).lines();

    let mut accepted: u64 = 0;
    let mut rejected: u64 = 0;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let normalized = RawEvent::from_json(line)
            .and_then(|raw| normalize_realtime_event(&raw, Utc::now().timestamp_millis()));
        match normalized {
            Ok(event) => {
                tx.send(event).await?;
                accepted += 1;
            }
            Err(e) => {
                warn!("Skipping message: {}", e);
                rejected += 1;
            }
        }
    }
    drop(tx);

    info!(accepted, rejected, "Input drained");

    let summaries = router.await??;
    for summary in &summaries {
        info!(
            symbol = %summary.symbol,
            events = summary.counters.events,
            active = summary.active_setups,
            scored = summary.counters.setups_scored,
            failures = summary.counters.scoring_failures,
            transitions = summary.counters.transitions,
            coach_suppressed = summary.coach_suppressed,
            "Symbol summary"
        );
        println!("{}", serde_json::to_string(summary)?);
    }

    info!("Shutdown complete");
    Ok(())
}
