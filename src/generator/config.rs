//! Generator tuning
//!
//! Defaults: a 2s base period divided by the frequency multiplier, a 30/70
//! incoming/outgoing split, and quantities that scale with the multiplier
//! (incoming 1..=10 units, outgoing 1..=3 units).

use super::GeneratorError;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::time::Duration;

/// How the product for each tick is chosen
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProductSelection {
    #[default]
    Uniform,
    /// Relative weight per product id; products not listed are never picked
    Weighted(BTreeMap<i64, u32>),
}

/// What to do when an outgoing draw exceeds available stock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutgoingPolicy {
    /// Skip the tick; nothing is recorded
    #[default]
    Skip,
    /// Retry once with the available stock when it is positive
    Clamp,
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Multiplier applied to cadence and quantities (>= 1)
    pub frequency: u32,
    pub base_interval: Duration,
    /// Stop after this long; `None` runs until cancelled
    pub duration: Option<Duration>,
    /// Probability that a tick produces an incoming movement
    pub incoming_weight: f64,
    /// Units per incoming movement, multiplied by `frequency`
    pub incoming_units: RangeInclusive<i64>,
    /// Units per outgoing movement, multiplied by `frequency`
    pub outgoing_units: RangeInclusive<i64>,
    pub selection: ProductSelection,
    pub outgoing_policy: OutgoingPolicy,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            frequency: 1,
            base_interval: Duration::from_millis(2000),
            duration: None,
            incoming_weight: 0.3,
            incoming_units: 1..=10,
            outgoing_units: 1..=3,
            selection: ProductSelection::Uniform,
            outgoing_policy: OutgoingPolicy::Skip,
            seed: None,
        }
    }
}

impl GeneratorConfig {
    pub fn with_frequency(mut self, frequency: u32) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Period between ticks: base interval divided by the frequency multiplier
    pub fn tick_interval(&self) -> Duration {
        self.base_interval / self.frequency.max(1)
    }

    pub fn validate(&self) -> Result<(), GeneratorError> {
        if self.frequency == 0 {
            return Err(GeneratorError::Config("frequency must be >= 1".to_string()));
        }
        if self.base_interval.is_zero() {
            return Err(GeneratorError::Config("base interval must be > 0".to_string()));
        }
        if !self.incoming_weight.is_finite() || !(0.0..=1.0).contains(&self.incoming_weight) {
            return Err(GeneratorError::Config(format!(
                "incoming weight must be within [0, 1], got {}",
                self.incoming_weight
            )));
        }
        check_units("incoming", &self.incoming_units, self.frequency)?;
        check_units("outgoing", &self.outgoing_units, self.frequency)?;

        if let ProductSelection::Weighted(weights) = &self.selection {
            if weights.values().all(|w| *w == 0) {
                return Err(GeneratorError::Config(
                    "weighted selection needs at least one positive weight".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn check_units(
    direction: &str,
    units: &RangeInclusive<i64>,
    frequency: u32,
) -> Result<(), GeneratorError> {
    if *units.start() < 1 || units.start() > units.end() {
        return Err(GeneratorError::Config(format!(
            "{} units must be a non-empty range of positive values, got {:?}",
            direction, units
        )));
    }
    // scaled quantities must stay representable
    if units.end().checked_mul(i64::from(frequency)).is_none() {
        return Err(GeneratorError::Config(format!(
            "{} units {:?} overflow when scaled by frequency {}",
            direction, units, frequency
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_interval_scales_with_frequency() {
        let config = GeneratorConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_millis(2000));
        assert_eq!(config.clone().with_frequency(5).tick_interval(), Duration::from_millis(400));
        assert_eq!(config.with_frequency(10).tick_interval(), Duration::from_millis(200));
    }

    #[test]
    fn test_defaults_validate() {
        assert!(GeneratorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(GeneratorConfig::default().with_frequency(0).validate().is_err());

        let mut config = GeneratorConfig::default();
        config.incoming_weight = 1.5;
        assert!(config.validate().is_err());

        let mut config = GeneratorConfig::default();
        config.outgoing_units = 0..=3;
        assert!(config.validate().is_err());

        let mut config = GeneratorConfig::default();
        config.selection = ProductSelection::Weighted(BTreeMap::from([(1, 0)]));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scaled_units_must_fit() {
        let mut config = GeneratorConfig::default().with_frequency(4);
        config.incoming_units = i64::MAX / 2..=i64::MAX / 2;
        assert!(matches!(config.validate(), Err(GeneratorError::Config(_))));

        config.incoming_units = 1..=i64::MAX / 4;
        assert!(config.validate().is_ok());

        let mut config = GeneratorConfig::default().with_frequency(2);
        config.outgoing_units = 1..=i64::MAX;
        assert!(config.validate().is_err());
    }
}
