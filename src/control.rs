//! Control interface used by process bootstrapping

use crate::generator::{GeneratorConfig, GeneratorError, GeneratorHandle, GeneratorReport};
use crate::store::{default_catalog, InventoryStore, NewProduct, StoreError};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Establish the schema and seed `catalog`
///
/// With `reset` the store is wiped first; without it an existing compatible
/// store is kept as-is and an incompatible one is a `StoreError::Schema`.
pub fn initialize_store(
    store: &InventoryStore,
    reset: bool,
    catalog: &[NewProduct],
) -> Result<(), StoreError> {
    store.create_schema(reset)?;
    let seeded = store.seed_products(catalog, reset)?;

    let products = store.query_products()?;
    log::info!(
        "✅ Store ready: {} ({} products, {} newly seeded)",
        store.db_path().display(),
        products.len(),
        seeded
    );
    Ok(())
}

/// Open the store at `path` and initialize it with the default catalog
pub fn open_and_initialize(path: impl AsRef<Path>, reset: bool) -> Result<InventoryStore, StoreError> {
    let store = InventoryStore::open(path)?;
    initialize_store(&store, reset, &default_catalog())?;
    Ok(store)
}

/// Start the generator at `frequency`, optionally bounded to `duration_secs`
pub fn start_generator(
    store: Arc<InventoryStore>,
    frequency: u32,
    duration_secs: Option<u64>,
) -> Result<GeneratorHandle, GeneratorError> {
    let config = GeneratorConfig::default()
        .with_frequency(frequency)
        .with_duration(duration_secs.map(Duration::from_secs));
    start_generator_with_config(store, config)
}

pub fn start_generator_with_config(
    store: Arc<InventoryStore>,
    config: GeneratorConfig,
) -> Result<GeneratorHandle, GeneratorError> {
    GeneratorHandle::spawn(store, config)
}

/// Stop a running generator and return its report
pub async fn stop_generator(handle: GeneratorHandle) -> Result<GeneratorReport, GeneratorError> {
    handle.stop().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::StopReason;
    use tempfile::TempDir;

    #[test]
    fn test_initialize_without_reset_keeps_data() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("inventory.db");

        let store = open_and_initialize(&path, true).unwrap();
        let product_id = store.query_products().unwrap()[0].product_id;
        store
            .append_movement(product_id, crate::store::MovementType::Incoming, 5)
            .unwrap();
        store.close().unwrap();

        let store = open_and_initialize(&path, false).unwrap();
        assert_eq!(store.query_products().unwrap().len(), 2);
        assert_eq!(store.query_movements(None).unwrap().len(), 1);

        initialize_store(&store, true, &default_catalog()).unwrap();
        assert!(store.query_movements(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_and_stop_generator() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(open_and_initialize(temp_dir.path().join("inventory.db"), true).unwrap());

        let handle = start_generator(Arc::clone(&store), 10, None).unwrap();
        tokio::time::sleep(Duration::from_millis(450)).await;
        let report = stop_generator(handle).await.unwrap();

        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert!(report.ticks >= 1);
        assert!(store.verify_replay().unwrap().is_empty());
    }

    #[test]
    fn test_zero_frequency_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(open_and_initialize(temp_dir.path().join("inventory.db"), true).unwrap());
        assert!(matches!(
            start_generator(store, 0, None),
            Err(GeneratorError::Config(_))
        ));
    }
}
