//! Rollups computed from one store snapshot

use super::timeline::{bucket_start, bucket_width_ms};
use super::window::WindowSpec;
use crate::store::{Movement, MovementType, Product, StoreError, StoreReader, StoreSnapshot};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Incoming/outgoing quantity pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlowTotals {
    pub incoming: i64,
    pub outgoing: i64,
}

impl FlowTotals {
    pub fn add(&mut self, movement_type: MovementType, quantity: i64) {
        match movement_type {
            MovementType::Incoming => self.incoming += quantity,
            MovementType::Outgoing => self.outgoing += quantity,
        }
    }

    pub fn net(&self) -> i64 {
        self.incoming - self.outgoing
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductStock {
    pub product_id: i64,
    pub name: String,
    pub category: String,
    pub current_stock: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineBucket {
    pub start_ms: i64,
    pub incoming: i64,
    pub outgoing: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Timeline {
    pub bucket_width_ms: i64,
    /// Contiguous, oldest first; empty when the window has no movements
    pub buckets: Vec<TimelineBucket>,
}

/// A movement annotated with its product for the activity feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEntry {
    pub movement_id: i64,
    pub timestamp: i64,
    pub product_id: i64,
    pub product_name: String,
    pub category: String,
    pub movement_type: MovementType,
    pub quantity: i64,
}

/// Headline numbers for the window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SummaryMetrics {
    pub total_movements: usize,
    pub incoming_count: usize,
    pub outgoing_count: usize,
    pub incoming_items: i64,
    pub outgoing_items: i64,
    pub net_change: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rollups {
    pub window: WindowSpec,
    /// Every catalog category is present, zero-valued when idle
    pub category_breakdown: BTreeMap<String, FlowTotals>,
    /// Not windowed: full-history stock for every product
    pub product_snapshot: Vec<ProductStock>,
    pub timeline: Timeline,
    /// Newest first
    pub recent_activity: Vec<ActivityEntry>,
    pub summary: SummaryMetrics,
}

/// Stateless query layer: window in, rollups out
#[derive(Debug, Clone)]
pub struct Aggregator {
    recent_limit: usize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RECENT_LIMIT)
    }
}

impl Aggregator {
    pub const DEFAULT_RECENT_LIMIT: usize = 10;

    pub fn new(recent_limit: usize) -> Self {
        Self { recent_limit }
    }

    pub fn recent_limit(&self) -> usize {
        self.recent_limit
    }

    /// Read one snapshot for `window` (cutoff taken from the reader's clock) and roll it up
    pub fn get_rollups(&self, reader: &StoreReader, window: WindowSpec) -> Result<Rollups, StoreError> {
        let now = reader.clock().now_ms();
        let snapshot = reader.read_snapshot(window.cutoff(now))?;
        Ok(self.compute(window, &snapshot))
    }

    /// Roll up a snapshot whose movements are already filtered to `window`
    pub fn compute(&self, window: WindowSpec, snapshot: &StoreSnapshot) -> Rollups {
        let products: HashMap<i64, &Product> = snapshot
            .products
            .iter()
            .map(|p| (p.product_id, p))
            .collect();

        let mut category_breakdown: BTreeMap<String, FlowTotals> = snapshot
            .products
            .iter()
            .map(|p| (p.category.clone(), FlowTotals::default()))
            .collect();
        let mut summary = SummaryMetrics::default();

        for movement in &snapshot.movements {
            let category = products
                .get(&movement.product_id)
                .map(|p| p.category.clone())
                .unwrap_or_else(|| UNKNOWN.to_string());
            category_breakdown
                .entry(category)
                .or_default()
                .add(movement.movement_type, movement.quantity);

            summary.total_movements += 1;
            match movement.movement_type {
                MovementType::Incoming => {
                    summary.incoming_count += 1;
                    summary.incoming_items += movement.quantity;
                }
                MovementType::Outgoing => {
                    summary.outgoing_count += 1;
                    summary.outgoing_items += movement.quantity;
                }
            }
        }
        summary.net_change = summary.incoming_items - summary.outgoing_items;

        let product_snapshot = snapshot
            .products
            .iter()
            .map(|p| ProductStock {
                product_id: p.product_id,
                name: p.name.clone(),
                category: p.category.clone(),
                current_stock: p.current_stock,
            })
            .collect();

        let recent_activity = snapshot
            .movements
            .iter()
            .rev()
            .take(self.recent_limit)
            .map(|m| annotate(m, products.get(&m.product_id).copied()))
            .collect();

        Rollups {
            window,
            category_breakdown,
            product_snapshot,
            timeline: build_timeline(window, &snapshot.movements),
            recent_activity,
            summary,
        }
    }
}

const UNKNOWN: &str = "(unknown)";

fn annotate(movement: &Movement, product: Option<&Product>) -> ActivityEntry {
    ActivityEntry {
        movement_id: movement.movement_id,
        timestamp: movement.timestamp,
        product_id: movement.product_id,
        product_name: product.map_or_else(|| UNKNOWN.to_string(), |p| p.name.clone()),
        category: product.map_or_else(|| UNKNOWN.to_string(), |p| p.category.clone()),
        movement_type: movement.movement_type,
        quantity: movement.quantity,
    }
}

/// Movements must be ordered by timestamp
fn build_timeline(window: WindowSpec, movements: &[Movement]) -> Timeline {
    let (first, last) = match (movements.first(), movements.last()) {
        (Some(first), Some(last)) => (first.timestamp, last.timestamp),
        _ => {
            return Timeline {
                bucket_width_ms: bucket_width_ms(window.duration_ms(), 0),
                buckets: Vec::new(),
            }
        }
    };

    let width = bucket_width_ms(window.duration_ms(), last - first);
    let first_bucket = bucket_start(first, width);
    let bucket_count = ((bucket_start(last, width) - first_bucket) / width + 1) as usize;

    let mut buckets: Vec<TimelineBucket> = (0..bucket_count)
        .map(|i| TimelineBucket {
            start_ms: first_bucket + i as i64 * width,
            incoming: 0,
            outgoing: 0,
        })
        .collect();

    for movement in movements {
        let index = ((bucket_start(movement.timestamp, width) - first_bucket) / width) as usize;
        let bucket = &mut buckets[index];
        match movement.movement_type {
            MovementType::Incoming => bucket.incoming += movement.quantity,
            MovementType::Outgoing => bucket.outgoing += movement.quantity,
        }
    }

    Timeline {
        bucket_width_ms: width,
        buckets,
    }
}
