//! Real-time inventory movement simulator
//!
//! A generator appends random stock movements to a SQLite store while a
//! refresh coordinator repeatedly rolls up windowed views of the same store.

pub mod aggregator;
pub mod config;
pub mod control;
pub mod generator;
pub mod insight;
pub mod refresh;
pub mod sqlite_pragma;
pub mod store;

pub use aggregator::{Aggregator, Rollups, WindowLabel, WindowSpec};
pub use config::StockflowConfig;
pub use generator::{GeneratorConfig, GeneratorHandle, GeneratorReport};
pub use refresh::{RefreshCoordinator, RefreshHandle, RefreshOutcome};
pub use store::{InventoryStore, StoreError, StoreReader};
