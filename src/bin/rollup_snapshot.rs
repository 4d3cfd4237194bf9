//! Rollup Snapshot - one-shot read of the inventory store
//!
//! Prints the rollups for a window label as pretty JSON on stdout.
//!
//! Usage:
//!   cargo run --bin rollup_snapshot -- ["15 minutes" | "1 hour" | "all time" | ...]
//!
//! Falls back to DEFAULT_WINDOW, then to 15 minutes for unknown labels.

use dotenv::dotenv;
use stockflow::aggregator::Aggregator;
use stockflow::config::StockflowConfig;
use stockflow::refresh::{RefreshCoordinator, RefreshOutcome};
use stockflow::store::{StoreReader, SystemClock};
use std::env;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = StockflowConfig::from_env()?;
    let label = env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let label = if label.trim().is_empty() {
        config.default_window.clone()
    } else {
        label
    };

    let reader = StoreReader::open(&config.db_path, Arc::new(SystemClock))?;
    let coordinator = RefreshCoordinator::new(
        Arc::new(reader),
        Aggregator::new(config.recent_limit),
        config.refresh_interval(),
    );

    let outcome = coordinator.get_rollups(&label);
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if let RefreshOutcome::Unavailable { reason, .. } = outcome {
        return Err(format!("data temporarily unavailable: {}", reason).into());
    }
    Ok(())
}
