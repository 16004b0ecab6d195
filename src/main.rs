//! Harvest - CCU analytics for user-generated game maps
//!
//! # Usage
//!
//! ```bash
//! # Serve the HTTP API
//! harvest serve --addr 0.0.0.0:8000
//!
//! # One-shot analysis of a single map, printed as JSON
//! harvest analyze 8530-0110-2817
//!
//! # Collect today's snapshot for every tracked map (run daily)
//! harvest collect
//! harvest collect --maps 8530-0110-2817,0038-9297-7629
//! ```
//!
//! # Environment Variables
//!
//! - `HARVEST_CONFIG`: Path to the TOML config (default: ./harvest.toml)
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use harvest::api::{create_app, AppState};
use harvest::collector::DailyCollector;
use harvest::{AnalyticsError, AnalyticsService, HarvestConfig, MapResolver, ModelRegistry};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(about = "CCU analytics for user-generated game maps")]
#[command(version)]
struct CliArgs {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (overrides HARVEST_CONFIG and ./harvest.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Serve the HTTP API
    Serve {
        /// Override the server address (default from config: "0.0.0.0:8000")
        #[arg(short, long)]
        addr: Option<String>,
    },

    /// Analyze one map and print every result as JSON
    Analyze {
        /// Map code, e.g. 8530-0110-2817
        map_code: String,

        /// Use only the live 7-day window for spike detection
        #[arg(long)]
        no_history: bool,
    },

    /// Collect today's CCU snapshot for tracked maps
    Collect {
        /// Comma-separated map codes (default: all tracked maps)
        #[arg(long, value_delimiter = ',')]
        maps: Option<Vec<String>>,
    },

    /// Print the effective configuration as TOML
    Config,
}

// ============================================================================
// Setup
// ============================================================================

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<HarvestConfig> {
    match path {
        Some(p) => HarvestConfig::load_from_file(p)
            .with_context(|| format!("Failed to load config from {}", p.display())),
        None => Ok(HarvestConfig::load()),
    }
}

fn build_service(config: Arc<HarvestConfig>) -> Result<AnalyticsService> {
    let registry = ModelRegistry::load(&config.data.models_dir);
    let resolver = MapResolver::from_config(&config).context("Failed to build map data sources")?;
    info!(
        sources = ?resolver.source_names(),
        models_dir = %config.data.models_dir.display(),
        "Analytics service ready"
    );
    Ok(AnalyticsService::new(config, Arc::new(registry), resolver))
}

// ============================================================================
// Commands
// ============================================================================

async fn run_serve(config: Arc<HarvestConfig>, addr: Option<String>) -> Result<()> {
    let server_addr = addr.unwrap_or_else(|| config.server.addr.clone());
    let service = Arc::new(build_service(config)?);
    let app = create_app(AppState::new(service));

    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind to {server_addr}"))?;
    info!(addr = %server_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Could not listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C, shutting down");
        })
        .await
        .context("HTTP server error")?;

    info!("Shutdown complete");
    Ok(())
}

/// Result or error message, so one failing analysis does not hide the rest.
fn section<T: Serialize>(result: Result<T, AnalyticsError>) -> serde_json::Value {
    match result {
        Ok(value) => serde_json::to_value(value)
            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() })),
        Err(e) => serde_json::json!({ "error": e.to_string() }),
    }
}

async fn run_analyze(config: Arc<HarvestConfig>, map_code: &str, no_history: bool) -> Result<()> {
    let service = build_service(config)?;
    // Fail fast on a bad code or unknown map rather than printing four errors
    service.fetch(map_code).await?;

    let report = serde_json::json!({
        "map_code": map_code,
        "anomalies": section(service.detect_anomalies(map_code, !no_history).await),
        "forecast": section(service.forecast(map_code).await),
        "discovery": section(service.discovery(map_code).await),
        "peak": section(service.predict_peak(map_code).await),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_collect(config: Arc<HarvestConfig>, maps: Option<Vec<String>>) -> Result<()> {
    let collector =
        DailyCollector::from_config(&config).context("Failed to build live map source")?;
    let codes = match maps {
        Some(codes) => codes
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect(),
        None => collector.tracked_maps().await,
    };
    if codes.is_empty() {
        warn!(
            tracked_maps = %config.data.tracked_maps.display(),
            "No maps to collect"
        );
    }

    let summary = collector.collect(&codes).await;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Ignoring unreadable .env file: {e}");
        }
    }
    init_tracing(args.log_json);

    let config = Arc::new(load_config(args.config.as_ref())?);

    match args.command {
        SubCommand::Serve { addr } => run_serve(config, addr).await,
        SubCommand::Analyze {
            map_code,
            no_history,
        } => run_analyze(config, &map_code, no_history).await,
        SubCommand::Collect { maps } => run_collect(config, maps).await,
        SubCommand::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
