//! Movement generator
//!
//! A scheduled task that draws one random movement per tick and records it
//! through `InventoryStore::append_movement`. The stop signal and the optional
//! duration bound are checked between ticks only; an append in flight always
//! completes before the loop observes cancellation.

pub mod config;
pub mod draw;

pub use config::{GeneratorConfig, OutgoingPolicy, ProductSelection};
pub use draw::{MovementGenerator, PlannedMovement};

use crate::store::{InventoryStore, MovementRecord, MovementType, StoreError};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

#[derive(Debug)]
pub enum GeneratorError {
    Config(String),
    /// Startup failure (store not initialized or unreachable)
    Store(StoreError),
    /// Generator task panicked or was aborted
    Join(String),
}

impl From<StoreError> for GeneratorError {
    fn from(err: StoreError) -> Self {
        GeneratorError::Store(err)
    }
}

impl std::fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneratorError::Config(msg) => write!(f, "Generator config error: {}", msg),
            GeneratorError::Store(e) => write!(f, "Generator store error: {}", e),
            GeneratorError::Join(msg) => write!(f, "Generator task failed: {}", msg),
        }
    }
}

impl std::error::Error for GeneratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GeneratorError::Store(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Cancelled,
    DurationElapsed,
}

/// Counters for one generator run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratorReport {
    pub ticks: u64,
    /// Movements written, clamped ones included
    pub recorded: u64,
    /// Ticks dropped on insufficient stock
    pub skipped: u64,
    /// Ticks lost to store errors
    pub failed: u64,
    pub clamped: u64,
    pub stop_reason: StopReason,
}

enum TickOutcome {
    Recorded,
    Clamped { record: MovementRecord, requested: i64 },
    Skipped,
}

enum Wake {
    Shutdown { closed: bool },
    Deadline,
    Tick,
}

/// Run the generator loop until `shutdown` flips to true (or its sender is
/// dropped) or `config.duration` elapses
///
/// Only startup problems are returned as errors. Once running, store failures
/// are logged and counted and the loop moves on to the next tick.
pub async fn run_generator(
    store: Arc<InventoryStore>,
    config: GeneratorConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<GeneratorReport, GeneratorError> {
    config.validate()?;

    let product_ids: Vec<i64> = {
        let store = Arc::clone(&store);
        tokio::task::spawn_blocking(move || store.query_products())
            .await
            .map_err(|e| GeneratorError::Join(e.to_string()))??
            .into_iter()
            .map(|p| p.product_id)
            .collect()
    };
    let mut generator = MovementGenerator::new(&config, &product_ids)?;

    let tick = config.tick_interval();
    log::info!(
        "🚀 Starting generator ({} products, frequency {}x, tick {}ms, duration {})",
        product_ids.len(),
        config.frequency,
        tick.as_millis(),
        config
            .duration
            .map(|d| format!("{}s", d.as_secs_f64()))
            .unwrap_or_else(|| "unbounded".to_string())
    );

    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = config.duration.map(|d| Instant::now() + d);

    let mut report = GeneratorReport {
        ticks: 0,
        recorded: 0,
        skipped: 0,
        failed: 0,
        clamped: 0,
        stop_reason: StopReason::Cancelled,
    };

    loop {
        if *shutdown.borrow() {
            report.stop_reason = StopReason::Cancelled;
            break;
        }

        let wake = tokio::select! {
            biased;
            changed = shutdown.changed() => Wake::Shutdown { closed: changed.is_err() },
            _ = sleep_until_deadline(deadline) => Wake::Deadline,
            _ = ticker.tick() => Wake::Tick,
        };

        match wake {
            Wake::Shutdown { closed: true } => {
                report.stop_reason = StopReason::Cancelled;
                break;
            }
            // value re-checked at the top of the loop
            Wake::Shutdown { closed: false } => continue,
            Wake::Deadline => {
                report.stop_reason = StopReason::DurationElapsed;
                break;
            }
            Wake::Tick => {}
        }

        let planned = generator.next_movement();
        let policy = config.outgoing_policy;
        let tick_store = Arc::clone(&store);
        let outcome =
            tokio::task::spawn_blocking(move || record_planned(&tick_store, planned, policy)).await;

        report.ticks += 1;
        match outcome {
            Ok(Ok(TickOutcome::Recorded)) => report.recorded += 1,
            Ok(Ok(TickOutcome::Clamped { record, requested })) => {
                report.recorded += 1;
                report.clamped += 1;
                log::debug!(
                    "🔧 Clamped outgoing for product {} from {} to {}",
                    record.movement.product_id,
                    requested,
                    record.movement.quantity
                );
            }
            Ok(Ok(TickOutcome::Skipped)) => report.skipped += 1,
            Ok(Err(e)) => {
                report.failed += 1;
                log::error!("❌ Generator tick failed ({}): {}", planned.product_id, e);
            }
            Err(e) => {
                report.failed += 1;
                log::error!("❌ Generator tick task failed: {}", e);
            }
        }
    }

    log::info!(
        "✅ Generator stopped ({:?}): {} ticks, {} recorded, {} skipped, {} clamped, {} failed",
        report.stop_reason,
        report.ticks,
        report.recorded,
        report.skipped,
        report.clamped,
        report.failed
    );

    Ok(report)
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

fn record_planned(
    store: &InventoryStore,
    planned: PlannedMovement,
    policy: OutgoingPolicy,
) -> Result<TickOutcome, StoreError> {
    match store.append_movement(planned.product_id, planned.movement_type, planned.quantity) {
        Ok(_) => Ok(TickOutcome::Recorded),
        Err(StoreError::InsufficientStock {
            product_id,
            requested,
            available,
        }) => {
            if policy == OutgoingPolicy::Clamp && available > 0 {
                let record = store.append_movement(product_id, MovementType::Outgoing, available)?;
                return Ok(TickOutcome::Clamped { record, requested });
            }
            log::warn!(
                "⚠️  Skipped outgoing {} for product {} (available {})",
                requested,
                product_id,
                available
            );
            Ok(TickOutcome::Skipped)
        }
        Err(e) => Err(e),
    }
}

/// A generator running on the tokio runtime
pub struct GeneratorHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<Result<GeneratorReport, GeneratorError>>,
}

impl GeneratorHandle {
    /// Validate `config` and spawn the loop
    pub fn spawn(store: Arc<InventoryStore>, config: GeneratorConfig) -> Result<Self, GeneratorError> {
        config.validate()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(run_generator(store, config, shutdown_rx));
        Ok(Self { shutdown_tx, join })
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signal the loop and wait for the tick in progress to finish
    pub async fn stop(self) -> Result<GeneratorReport, GeneratorError> {
        let _ = self.shutdown_tx.send(true);
        self.wait().await
    }

    /// Wait for the loop to end on its own (duration bound)
    pub async fn wait(self) -> Result<GeneratorReport, GeneratorError> {
        let GeneratorHandle { shutdown_tx, join } = self;
        let result = join.await.map_err(|e| GeneratorError::Join(e.to_string()))?;
        drop(shutdown_tx);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{default_catalog, NewProduct};
    use std::time::Duration;
    use tempfile::TempDir;

    fn fast_config() -> GeneratorConfig {
        GeneratorConfig {
            base_interval: Duration::from_millis(5),
            seed: Some(42),
            ..GeneratorConfig::default()
        }
    }

    fn setup_store(catalog: &[NewProduct]) -> (TempDir, Arc<InventoryStore>) {
        let temp_dir = TempDir::new().unwrap();
        let store = InventoryStore::open(temp_dir.path().join("inventory.db")).unwrap();
        store.create_schema(true).unwrap();
        store.seed_products(catalog, true).unwrap();
        (temp_dir, Arc::new(store))
    }

    #[tokio::test]
    async fn test_duration_bound_stops_loop() {
        let (_tmp, store) = setup_store(&default_catalog());
        let config = fast_config().with_duration(Some(Duration::from_millis(150)));
        let (_tx, rx) = watch::channel(false);

        let report = run_generator(Arc::clone(&store), config, rx).await.unwrap();

        assert_eq!(report.stop_reason, StopReason::DurationElapsed);
        assert!(report.ticks > 0);
        assert_eq!(report.ticks, report.recorded + report.skipped + report.failed);
        assert_eq!(report.failed, 0);

        let movements = store.query_movements(None).unwrap();
        assert_eq!(movements.len() as u64, report.recorded);
        assert!(store.verify_replay().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_signal_cancels_between_ticks() {
        let (_tmp, store) = setup_store(&default_catalog());
        let handle = GeneratorHandle::spawn(Arc::clone(&store), fast_config()).unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!handle.is_finished());
        let report = handle.stop().await.unwrap();

        assert_eq!(report.stop_reason, StopReason::Cancelled);
        let recorded = store.query_movements(None).unwrap().len() as u64;
        assert_eq!(recorded, report.recorded);

        // nothing written after stop returned
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.query_movements(None).unwrap().len() as u64, recorded);
    }

    #[tokio::test]
    async fn test_skip_policy_never_goes_negative() {
        let (_tmp, store) = setup_store(&[NewProduct::new("Empty Bin", "Type A", 0)]);
        let mut config = fast_config().with_duration(Some(Duration::from_millis(80)));
        config.incoming_weight = 0.0;
        let (_tx, rx) = watch::channel(false);

        let report = run_generator(Arc::clone(&store), config, rx).await.unwrap();

        assert_eq!(report.recorded, 0);
        assert_eq!(report.skipped, report.ticks);
        assert!(store.query_movements(None).unwrap().is_empty());
        assert_eq!(store.query_products().unwrap()[0].current_stock, 0);
    }

    #[tokio::test]
    async fn test_clamp_policy_drains_to_zero_once() {
        let (_tmp, store) = setup_store(&[NewProduct::new("Small Bin", "Type A", 2)]);
        let mut config = fast_config().with_duration(Some(Duration::from_millis(80)));
        config.incoming_weight = 0.0;
        config.outgoing_units = 5..=5;
        config.outgoing_policy = OutgoingPolicy::Clamp;
        let (_tx, rx) = watch::channel(false);

        let report = run_generator(Arc::clone(&store), config, rx).await.unwrap();

        assert_eq!(report.clamped, 1);
        assert_eq!(report.recorded, 1);
        let movements = store.query_movements(None).unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].quantity, 2);
        assert_eq!(store.query_products().unwrap()[0].current_stock, 0);
    }

    #[tokio::test]
    async fn test_store_failures_counted_and_loop_continues() {
        let (tmp, store) = setup_store(&default_catalog());
        let config = fast_config().with_duration(Some(Duration::from_millis(300)));
        let handle = GeneratorHandle::spawn(Arc::clone(&store), config).unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        let raw = rusqlite::Connection::open(tmp.path().join("inventory.db")).unwrap();
        raw.execute_batch("DROP TABLE movements;").unwrap();
        drop(raw);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!handle.is_finished());

        let report = handle.wait().await.unwrap();
        assert_eq!(report.stop_reason, StopReason::DurationElapsed);
        assert!(report.failed > 0);
        assert_eq!(report.ticks, report.recorded + report.skipped + report.failed);
    }

    #[tokio::test]
    async fn test_uninitialized_store_fails_at_startup() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(InventoryStore::open(temp_dir.path().join("bare.db")).unwrap());
        let (_tx, rx) = watch::channel(false);

        let result = run_generator(store, fast_config(), rx).await;
        assert!(matches!(result, Err(GeneratorError::Store(StoreError::Schema(_)))));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_spawn() {
        let (_tmp, store) = setup_store(&default_catalog());
        let result = GeneratorHandle::spawn(store, fast_config().with_frequency(0));
        assert!(matches!(result, Err(GeneratorError::Config(_))));
    }
}
