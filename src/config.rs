//! Runtime configuration from environment variables

use crate::aggregator::{Aggregator, WindowLabel};
use crate::generator::GeneratorConfig;
use crate::refresh::RefreshCoordinator;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for the stockflow runtime
///
/// Loaded from environment variables with defaults matching the classic
/// simulator (2s generator period, 5s refresh, 30 minute window).
#[derive(Debug, Clone)]
pub struct StockflowConfig {
    /// Path to SQLite database file
    pub db_path: PathBuf,

    /// Drop and recreate the schema at startup
    pub reset: bool,

    /// Generator frequency multiplier
    pub frequency: u32,

    pub base_interval_ms: u64,

    /// Optional generator run bound
    pub duration_secs: Option<u64>,

    /// Probability of an incoming movement
    pub incoming_weight: f64,

    pub refresh_interval_ms: u64,

    /// Window label used by the refresh loop at startup
    pub default_window: String,

    /// Size of the recent activity feed
    pub recent_limit: usize,

    /// Append refresh outcomes here as JSON lines when set
    pub rollup_output_path: Option<PathBuf>,
}

impl Default for StockflowConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/realtime_inventory.db"),
            reset: true,
            frequency: 1,
            base_interval_ms: 2_000,
            duration_secs: None,
            incoming_weight: 0.3,
            refresh_interval_ms: RefreshCoordinator::DEFAULT_INTERVAL.as_millis() as u64,
            default_window: WindowLabel::Min30.as_str().to_string(),
            recent_limit: Aggregator::DEFAULT_RECENT_LIMIT,
            rollup_output_path: None,
        }
    }
}

impl StockflowConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `STOCKFLOW_DB_PATH` (default: data/realtime_inventory.db)
    /// - `STOCKFLOW_RESET` (default: true)
    /// - `GENERATOR_FREQUENCY` (default: 1)
    /// - `GENERATOR_BASE_INTERVAL_MS` (default: 2000)
    /// - `GENERATOR_DURATION_SECS` (default: unbounded)
    /// - `GENERATOR_INCOMING_WEIGHT` (default: 0.3)
    /// - `REFRESH_INTERVAL_MS` (default: 5000)
    /// - `DEFAULT_WINDOW` (default: "30 minutes")
    /// - `RECENT_ACTIVITY_LIMIT` (default: 10)
    /// - `ROLLUP_OUTPUT_PATH` (default: unset)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = Self {
            db_path: get("STOCKFLOW_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            reset: parse_opt(&get, "STOCKFLOW_RESET")?.unwrap_or(defaults.reset),
            frequency: parse_opt(&get, "GENERATOR_FREQUENCY")?.unwrap_or(defaults.frequency),
            base_interval_ms: parse_opt(&get, "GENERATOR_BASE_INTERVAL_MS")?
                .unwrap_or(defaults.base_interval_ms),
            duration_secs: parse_opt(&get, "GENERATOR_DURATION_SECS")?,
            incoming_weight: parse_opt(&get, "GENERATOR_INCOMING_WEIGHT")?
                .unwrap_or(defaults.incoming_weight),
            refresh_interval_ms: parse_opt(&get, "REFRESH_INTERVAL_MS")?
                .unwrap_or(defaults.refresh_interval_ms),
            default_window: get("DEFAULT_WINDOW").unwrap_or(defaults.default_window),
            recent_limit: parse_opt(&get, "RECENT_ACTIVITY_LIMIT")?.unwrap_or(defaults.recent_limit),
            rollup_output_path: get("ROLLUP_OUTPUT_PATH").map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.frequency == 0 {
            return Err(ConfigError::InvalidValue("GENERATOR_FREQUENCY must be >= 1".to_string()));
        }
        if self.base_interval_ms == 0 || self.refresh_interval_ms == 0 {
            return Err(ConfigError::InvalidValue("intervals must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.incoming_weight) {
            return Err(ConfigError::InvalidValue(format!(
                "GENERATOR_INCOMING_WEIGHT must be within [0, 1], got {}",
                self.incoming_weight
            )));
        }
        Ok(())
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            frequency: self.frequency,
            base_interval: Duration::from_millis(self.base_interval_ms),
            duration: self.duration_secs.map(Duration::from_secs),
            incoming_weight: self.incoming_weight,
            ..GeneratorConfig::default()
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

fn parse_opt<T, G>(get: &G, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| ConfigError::InvalidValue(format!("{}={:?}: {}", key, raw, e)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = StockflowConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.db_path, PathBuf::from("data/realtime_inventory.db"));
        assert!(config.reset);
        assert_eq!(config.frequency, 1);
        assert_eq!(config.base_interval_ms, 2_000);
        assert_eq!(config.duration_secs, None);
        assert_eq!(config.refresh_interval_ms, 5_000);
        assert_eq!(config.default_window, "30 minutes");
        assert_eq!(config.recent_limit, 10);
        assert_eq!(config.rollup_output_path, None);
    }

    #[test]
    fn test_custom_config() {
        let config = StockflowConfig::from_lookup(lookup(&[
            ("STOCKFLOW_DB_PATH", "/tmp/test.db"),
            ("STOCKFLOW_RESET", "false"),
            ("GENERATOR_FREQUENCY", "5"),
            ("GENERATOR_DURATION_SECS", "60"),
            ("DEFAULT_WINDOW", "1 hour"),
            ("ROLLUP_OUTPUT_PATH", "/tmp/rollups.jsonl"),
        ]))
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/test.db"));
        assert!(!config.reset);
        assert_eq!(config.default_window, "1 hour");
        assert_eq!(config.rollup_output_path, Some(PathBuf::from("/tmp/rollups.jsonl")));

        let generator = config.generator_config();
        assert_eq!(generator.tick_interval(), Duration::from_millis(400));
        assert_eq!(generator.duration, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = StockflowConfig::from_lookup(lookup(&[("GENERATOR_FREQUENCY", "  ")])).unwrap();
        assert_eq!(config.frequency, 1);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = StockflowConfig::from_lookup(lookup(&[("GENERATOR_FREQUENCY", "fast")])).unwrap_err();
        assert!(err.to_string().contains("GENERATOR_FREQUENCY"));

        assert!(StockflowConfig::from_lookup(lookup(&[("GENERATOR_FREQUENCY", "0")])).is_err());
        assert!(StockflowConfig::from_lookup(lookup(&[("GENERATOR_INCOMING_WEIGHT", "2")])).is_err());
    }
}
