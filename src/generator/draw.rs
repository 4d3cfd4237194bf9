//! Random movement draws, independent of the store

use super::config::{GeneratorConfig, ProductSelection};
use super::GeneratorError;
use crate::store::MovementType;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;

/// One movement the generator intends to record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedMovement {
    pub product_id: i64,
    pub movement_type: MovementType,
    pub quantity: i64,
}

enum Picker {
    Uniform(Vec<i64>),
    Weighted {
        product_ids: Vec<i64>,
        index: WeightedIndex<u32>,
    },
}

pub struct MovementGenerator {
    rng: StdRng,
    picker: Picker,
    incoming_weight: f64,
    incoming_units: RangeInclusive<i64>,
    outgoing_units: RangeInclusive<i64>,
    frequency: i64,
}

impl MovementGenerator {
    /// Build a generator over `product_ids` (the seeded catalog)
    pub fn new(config: &GeneratorConfig, product_ids: &[i64]) -> Result<Self, GeneratorError> {
        config.validate()?;

        if product_ids.is_empty() {
            return Err(GeneratorError::Config("no products to move".to_string()));
        }

        let picker = match &config.selection {
            ProductSelection::Uniform => Picker::Uniform(product_ids.to_vec()),
            ProductSelection::Weighted(weights) => {
                let (ids, product_weights): (Vec<i64>, Vec<u32>) = product_ids
                    .iter()
                    .map(|id| (*id, weights.get(id).copied().unwrap_or(0)))
                    .unzip();
                let index = WeightedIndex::new(&product_weights).map_err(|e| {
                    GeneratorError::Config(format!("product weights unusable: {}", e))
                })?;
                Picker::Weighted {
                    product_ids: ids,
                    index,
                }
            }
        };

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            rng,
            picker,
            incoming_weight: config.incoming_weight,
            incoming_units: config.incoming_units.clone(),
            outgoing_units: config.outgoing_units.clone(),
            frequency: i64::from(config.frequency),
        })
    }

    fn pick_product(&mut self) -> i64 {
        match &self.picker {
            Picker::Uniform(ids) => ids.choose(&mut self.rng).copied().unwrap_or_default(),
            Picker::Weighted { product_ids, index } => product_ids[index.sample(&mut self.rng)],
        }
    }

    pub fn next_movement(&mut self) -> PlannedMovement {
        let product_id = self.pick_product();

        let (movement_type, units) = if self.rng.gen_bool(self.incoming_weight) {
            (MovementType::Incoming, self.incoming_units.clone())
        } else {
            (MovementType::Outgoing, self.outgoing_units.clone())
        };

        PlannedMovement {
            product_id,
            movement_type,
            quantity: self.rng.gen_range(units) * self.frequency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn seeded(config: GeneratorConfig) -> MovementGenerator {
        MovementGenerator::new(&config.with_seed(7), &[1, 2]).unwrap()
    }

    #[test]
    fn test_quantities_scale_with_frequency() {
        let mut generator = seeded(GeneratorConfig::default().with_frequency(5));

        for _ in 0..500 {
            let planned = generator.next_movement();
            assert_eq!(planned.quantity % 5, 0);
            match planned.movement_type {
                MovementType::Incoming => assert!((5..=50).contains(&planned.quantity)),
                MovementType::Outgoing => assert!((5..=15).contains(&planned.quantity)),
            }
            assert!(planned.product_id == 1 || planned.product_id == 2);
        }
    }

    #[test]
    fn test_direction_bias() {
        let mut generator = seeded(GeneratorConfig::default());
        let incoming = (0..2000)
            .filter(|_| generator.next_movement().movement_type == MovementType::Incoming)
            .count();
        // 30% nominal
        assert!((450..=750).contains(&incoming), "incoming draws: {}", incoming);
    }

    #[test]
    fn test_weighted_selection_excludes_unweighted_products() {
        let mut config = GeneratorConfig::default();
        config.selection = ProductSelection::Weighted(BTreeMap::from([(2, 3)]));
        let mut generator = seeded(config);

        assert!((0..200).all(|_| generator.next_movement().product_id == 2));
    }

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = seeded(GeneratorConfig::default());
        let mut b = seeded(GeneratorConfig::default());
        for _ in 0..50 {
            assert_eq!(a.next_movement(), b.next_movement());
        }
    }

    #[test]
    fn test_overflowing_units_rejected_at_construction() {
        let mut config = GeneratorConfig::default().with_frequency(4);
        config.incoming_units = i64::MAX / 2..=i64::MAX / 2;
        config.outgoing_units = i64::MAX / 2..=i64::MAX / 2;
        assert!(matches!(
            MovementGenerator::new(&config, &[1]),
            Err(GeneratorError::Config(_))
        ));
    }

    #[test]
    fn test_empty_catalog_rejected() {
        assert!(MovementGenerator::new(&GeneratorConfig::default(), &[]).is_err());
    }
}
