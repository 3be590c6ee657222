//! Practice Dashboard: metrics API for a behavioral-health practice.
//!
//! Loads payment records and settings, then serves `/api/metrics`.

mod data;

use clap::Parser;
use practice_api::{ApiServer, AppState};
use practice_core::config::AppConfig;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "practice-dashboard")]
#[command(about = "Practice metrics dashboard API")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "PRACTICE_DASHBOARD__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "PRACTICE_DASHBOARD__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Payment records, JSON or CSV (overrides config)
    #[arg(long, env = "PRACTICE_DASHBOARD__DATA__RECORDS_PATH")]
    records: Option<String>,

    /// Practice settings JSON (overrides config)
    #[arg(long, env = "PRACTICE_DASHBOARD__DATA__SETTINGS_PATH")]
    settings: Option<String>,

    /// Seed for generated data when no records file is given
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "practice_dashboard=info,practice_api=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Practice Dashboard starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(records) = cli.records {
        config.data.records_path = Some(records);
    }
    if let Some(settings) = cli.settings {
        config.data.settings_path = Some(settings);
    }
    if let Some(seed) = cli.seed {
        config.data.seed = seed;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        metrics_port = config.metrics.port,
        "Configuration loaded"
    );

    let (store, generated_name) = data::load_records(&config.data)?;
    let settings = data::load_settings(&config.data, generated_name)?;
    info!(
        practice = %settings.practice_name,
        records = store.len(),
        "Practice data ready"
    );

    let state = AppState::new(&config, store, settings)?;
    let api_server = ApiServer::new(config, state);

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Practice Dashboard is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
