//! Stockflow Runtime - generator plus live rollups
//!
//! Opens (and by default resets) the inventory store, starts the movement
//! generator, and runs the refresh coordinator until CTRL+C.
//!
//! Usage:
//!   cargo run --release --bin stockflow_runtime -- [--no-reset] [--frequency N] [--duration SECS]
//!
//! Environment variables (flags take precedence):
//!   STOCKFLOW_DB_PATH - SQLite database path (default: data/realtime_inventory.db)
//!   STOCKFLOW_RESET - Reset the store at startup (default: true)
//!   GENERATOR_FREQUENCY - Frequency multiplier (default: 1)
//!   GENERATOR_DURATION_SECS - Generator run bound (default: unbounded)
//!   REFRESH_INTERVAL_MS - Refresh cadence (default: 5000)
//!   DEFAULT_WINDOW - Window label (default: "30 minutes")
//!   ROLLUP_OUTPUT_PATH - JSONL output for refresh outcomes (default: log only)

use dotenv::dotenv;
use log::{error, info, warn};
use stockflow::aggregator::Aggregator;
use stockflow::config::StockflowConfig;
use stockflow::control::{initialize_store, start_generator_with_config, stop_generator};
use stockflow::refresh::{JsonlRollupSink, LogRollupSink, RefreshCoordinator, RollupSink};
use stockflow::store::{default_catalog, InventoryStore};
use std::env;
use std::sync::Arc;

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|idx| args.get(idx + 1))
        .cloned()
}

fn apply_args(config: &mut StockflowConfig) -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--no-reset") {
        config.reset = false;
    }
    if let Some(frequency) = arg_value(&args, "--frequency") {
        config.frequency = frequency.parse()?;
    }
    if let Some(duration) = arg_value(&args, "--duration") {
        config.duration_secs = Some(duration.parse()?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let mut config = StockflowConfig::from_env()?;
    apply_args(&mut config)?;

    info!("🚀 Stockflow Runtime");
    info!("   ├─ Database: {}", config.db_path.display());
    info!("   ├─ Reset: {}", config.reset);
    info!("   ├─ Frequency: {}x", config.frequency);
    info!(
        "   ├─ Duration: {}",
        config
            .duration_secs
            .map(|s| format!("{}s", s))
            .unwrap_or_else(|| "until CTRL+C".to_string())
    );
    info!("   ├─ Refresh interval: {}ms", config.refresh_interval_ms);
    info!("   └─ Window: {}", config.default_window);

    info!("🔧 Initializing store...");
    let store = InventoryStore::open(&config.db_path)?;
    initialize_store(&store, config.reset, &default_catalog())?;
    let store = Arc::new(store);

    let generator = start_generator_with_config(Arc::clone(&store), config.generator_config())?;
    info!("✅ Generator spawned");

    let sink: Box<dyn RollupSink> = match &config.rollup_output_path {
        Some(path) => Box::new(JsonlRollupSink::open(path)?),
        None => Box::new(LogRollupSink),
    };
    let coordinator = RefreshCoordinator::new(
        Arc::new(store.reader()?),
        Aggregator::new(config.recent_limit),
        config.refresh_interval(),
    );
    let refresh = coordinator.spawn(&config.default_window, sink);
    info!("✅ Refresh coordinator spawned");
    info!("🔄 Press CTRL+C to shutdown gracefully");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("");
            info!("⚠️  Received CTRL+C, shutting down...");
        }
        Err(err) => {
            error!("❌ Failed to listen for CTRL+C: {}", err);
        }
    }

    match stop_generator(generator).await {
        Ok(report) => info!("📊 Generator report: {}", serde_json::to_string(&report)?),
        Err(e) => error!("❌ Generator ended with error: {}", e),
    }

    match refresh.stop().await {
        Ok(report) => info!("📊 Refresh report: {}", serde_json::to_string(&report)?),
        Err(e) => error!("❌ Refresh coordinator task failed: {}", e),
    }

    let mismatches = store.verify_replay()?;
    if mismatches.is_empty() {
        info!("✅ Replay audit passed");
    } else {
        for mismatch in &mismatches {
            error!(
                "❌ Product {}: stored {} vs replayed {}",
                mismatch.product_id, mismatch.stored_stock, mismatch.replayed_stock
            );
        }
    }

    match Arc::try_unwrap(store) {
        Ok(store) => store.close()?,
        Err(_) => warn!("⚠️  Store still shared at shutdown, leaving it to drop"),
    }

    info!("✅ Stockflow runtime stopped");
    Ok(())
}
