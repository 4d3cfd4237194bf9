//! Core records held by the inventory store

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Incoming,
    Outgoing,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Incoming => "incoming",
            MovementType::Outgoing => "outgoing",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "incoming" => Some(MovementType::Incoming),
            "outgoing" => Some(MovementType::Outgoing),
            _ => None,
        }
    }

    /// Signed stock effect of moving `quantity` units in this direction
    pub fn signed(&self, quantity: i64) -> i64 {
        match self {
            MovementType::Incoming => quantity,
            MovementType::Outgoing => -quantity,
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog entry used to seed the products table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub category: String,
    pub initial_stock: i64,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, category: impl Into<String>, initial_stock: i64) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            initial_stock,
        }
    }
}

/// A product row
///
/// `current_stock` is a materialized fold: `initial_stock` plus every incoming
/// quantity minus every outgoing quantity recorded for this product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: i64,
    pub name: String,
    pub category: String,
    pub initial_stock: i64,
    pub current_stock: i64,
}

/// An immutable movement row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub movement_id: i64,
    pub product_id: i64,
    /// Unix milliseconds, non-decreasing across the log
    pub timestamp: i64,
    pub movement_type: MovementType,
    pub quantity: i64,
}

/// Result of a successful append: the recorded movement and the stock it produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRecord {
    pub movement: Movement,
    pub stock_after: i64,
}

/// Products and in-window movements read inside one snapshot transaction
///
/// `products` always reflects exactly the movements committed before the
/// snapshot began, so stock levels and the log can never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreSnapshot {
    pub products: Vec<Product>,
    /// Ordered by (timestamp, movement_id)
    pub movements: Vec<Movement>,
}

/// A product whose stored stock disagrees with its replayed log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayMismatch {
    pub product_id: i64,
    pub stored_stock: i64,
    pub replayed_stock: i64,
}
