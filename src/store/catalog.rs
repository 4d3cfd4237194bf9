use super::types::NewProduct;

/// Seed catalog used by the runtime when no catalog is supplied
pub fn default_catalog() -> Vec<NewProduct> {
    vec![
        NewProduct::new("Cylindrical Product", "Type A", 75),
        NewProduct::new("Box Product", "Type B", 150),
    ]
}
