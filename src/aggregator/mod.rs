//! Windowed rollups over the movement log
//!
//! The aggregator holds no state between calls. Each call reads one
//! consistent snapshot through a `StoreReader`, filtered by the window cutoff,
//! and folds it in memory.

pub mod rollups;
pub mod timeline;
pub mod window;

pub use rollups::{
    ActivityEntry, Aggregator, FlowTotals, ProductStock, Rollups, SummaryMetrics, Timeline,
    TimelineBucket,
};
pub use timeline::{bucket_start, bucket_width_ms};
pub use window::{parse_window_label, WindowError, WindowLabel, WindowSpec};
