//! Inventory store: products and the append-only movement log
//!
//! ```text
//! Generator ──append_movement──▶ InventoryStore (single writer, IMMEDIATE tx)
//!                                     │  WAL
//! Aggregator ◀──read_snapshot──── StoreReader (query_only, deferred tx)
//! ```
//!
//! The store is the only synchronization point between the generator and any
//! number of readers. `products.current_stock` is a materialized fold over the
//! movement log; `replay_stock` recomputes that fold from scratch.

pub mod catalog;
pub mod clock;
pub mod error;
pub mod sqlite;
pub mod types;

pub use catalog::default_catalog;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::StoreError;
pub use sqlite::{InventoryStore, StoreReader, SCHEMA_VERSION};
pub use types::{
    Movement, MovementRecord, MovementType, NewProduct, Product, ReplayMismatch, StoreSnapshot,
};

use std::collections::BTreeMap;

/// Fold the movement log into per-product stock, starting from `initial_stock`
///
/// Movements for products not in `products` are ignored.
pub fn replay_stock(products: &[Product], movements: &[Movement]) -> BTreeMap<i64, i64> {
    let mut stock: BTreeMap<i64, i64> = products
        .iter()
        .map(|p| (p.product_id, p.initial_stock))
        .collect();

    for movement in movements {
        if let Some(level) = stock.get_mut(&movement.product_id) {
            *level += movement.movement_type.signed(movement.quantity);
        }
    }

    stock
}
